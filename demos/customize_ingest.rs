//! Programmatic ingest + HLS example
//!
//! Run with: cargo run --example customize_ingest
//!
//! Feeds synthetic Annex-B H.264 and ADTS AAC through the customize
//! entry point and lets the group's MPEG-TS pipeline write HLS segments
//! under ./hls/live_custom/.

use bytes::Bytes;

use livehub::customize::CustomizeIngest;
use livehub::group::{GroupConfig, ServerManager, SessionProtocol};
use livehub::hls::HlsConfig;
use livehub::media::aac::{generate_adts_header, AudioSpecificConfig};

fn annexb_keyframe_au() -> Vec<u8> {
    let mut au = Vec::new();
    for nalu in [
        &[0x67, 0x64, 0x00, 0x1F][..], // SPS
        &[0x68, 0xEF, 0x38][..],       // PPS
        &[0x65, 0x88, 0x84, 0x00][..], // IDR
    ] {
        au.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        au.extend_from_slice(nalu);
    }
    au
}

fn annexb_slice_au() -> Vec<u8> {
    let mut au = vec![0x00, 0x00, 0x00, 0x01];
    au.extend_from_slice(&[0x41, 0x9A, 0x00, 0x00]);
    au
}

fn adts_frame(config: &AudioSpecificConfig) -> Vec<u8> {
    let payload = [0x21u8; 64];
    let mut frame = generate_adts_header(config, payload.len()).to_vec();
    frame.extend_from_slice(&payload);
    frame
}

#[tokio::main]
async fn main() -> livehub::Result<()> {
    tracing_subscriber::fmt().init();

    let config = GroupConfig::default().hls(HlsConfig {
        root: "hls".into(),
        playlist_length: 6,
        delete_evicted: true,
    });
    let manager = ServerManager::new(config);

    let id = manager.next_session_id();
    let handle = manager
        .attach_publisher("live_custom", id, SessionProtocol::Customize)
        .await?;
    let mut ingest = CustomizeIngest::new(handle);
    ingest.set_aac_config(Bytes::from_static(&[0x12, 0x10]))?;

    let asc = AudioSpecificConfig::from_parts(2, 4, 2);

    // Two seconds per GOP, three GOPs: two closed fragments on disk.
    for gop in 0u64..3 {
        let base = gop * 2000;
        ingest.feed_h264_annexb(&annexb_keyframe_au(), base).await?;
        for i in 1..10u64 {
            ingest
                .feed_h264_annexb(&annexb_slice_au(), base + i * 200)
                .await?;
            ingest
                .feed_aac_adts(&Bytes::from(adts_frame(&asc)), base + i * 200)
                .await?;
        }
    }
    ingest.finish().await;

    let playlist = std::fs::read_to_string("hls/live_custom/playlist.m3u8")?;
    println!("--- playlist.m3u8 ---\n{playlist}");
    Ok(())
}
