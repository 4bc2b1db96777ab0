//! Fan-out hub example
//!
//! Run with: cargo run --example fanout_hub
//!
//! Wires a manager with one synthetic RTMP-style publisher and two
//! subscribers on different output protocols (HTTP-FLV frames and RTSP
//! RTP packets), then prints what each side sees. No sockets: the
//! protocol front-ends are stand-ins feeding parsed messages, which is
//! exactly the boundary a real server embeds against.

use bytes::Bytes;

use livehub::group::{GroupConfig, OutFrame, ServerManager, SessionProtocol};
use livehub::media::FlvTag;

fn avc_seq_header() -> FlvTag {
    let mut body = vec![0x17u8, 0x00, 0x00, 0x00, 0x00];
    body.extend_from_slice(&[
        0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00,
        0x03, 0x68, 0xEF, 0x38,
    ]);
    FlvTag::video(0, Bytes::from(body))
}

fn video_frame(dts: u32, key: bool) -> FlvTag {
    let mut body = vec![if key { 0x17u8 } else { 0x27 }, 0x01, 0x00, 0x00, 0x00];
    let nalu: &[u8] = if key {
        &[0x65, 0x88, 0x84, 0x00, 0x01]
    } else {
        &[0x41, 0x9A, 0x00, 0x00, 0x01]
    };
    body.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
    body.extend_from_slice(nalu);
    FlvTag::video(dts, Bytes::from(body))
}

#[tokio::main]
async fn main() -> livehub::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let manager = std::sync::Arc::new(ServerManager::new(GroupConfig::default()));
    let _gc = manager.spawn_tick_task();

    // Publisher attaches and streams a short GOP.
    let pub_id = manager.next_session_id();
    let publisher = manager
        .attach_publisher("live/demo", pub_id, SessionProtocol::Rtmp)
        .await?;
    publisher.publish_flv_tag(&avc_seq_header()).await?;
    publisher.publish_flv_tag(&video_frame(0, true)).await?;
    publisher.publish_flv_tag(&video_frame(33, false)).await?;

    // A late HTTP-FLV subscriber: initial burst replays header + GOP.
    let flv_id = manager.next_session_id();
    let flv_sub = manager
        .attach_subscriber("live/demo", flv_id, SessionProtocol::HttpFlv)
        .await?;

    // An RTSP subscriber: SDP out of band, RTP packets in the queue.
    let rtsp_id = manager.next_session_id();
    let rtsp_sub = manager
        .attach_subscriber("live/demo", rtsp_id, SessionProtocol::Rtsp)
        .await?;
    let group = manager.group("live/demo").await.expect("group exists");
    println!("--- SDP ---\n{}", group.sdp().await.expect("sdp ready"));

    publisher.publish_flv_tag(&video_frame(66, false)).await?;
    publisher.publish_flv_tag(&video_frame(2000, true)).await?;

    manager.detach_subscriber("live/demo", flv_id).await;
    manager.detach_subscriber("live/demo", rtsp_id).await;

    while let Some(frame) = flv_sub.recv().await? {
        if let OutFrame::Media(msg) = frame {
            println!(
                "flv sub:  dts={:<5} kind={:?} key={} header={}",
                msg.dts, msg.kind, msg.is_keyframe, msg.is_seq_header
            );
        }
    }
    while let Some(frame) = rtsp_sub.recv().await? {
        if let OutFrame::Rtp(out) = frame {
            println!(
                "rtsp sub: seq={:<5} ts={:<8} marker={} key={}",
                out.packet.header.seq,
                out.packet.header.timestamp,
                out.packet.header.marker,
                out.keyframe
            );
        }
    }

    publisher.finish().await;
    let stats = group.stats().await;
    println!(
        "group stats: msgs_in={} bytes_in={} peak_subscribers={}",
        stats.msgs_in, stats.bytes_in, stats.peak_subscribers
    );
    Ok(())
}
