//! Group and manager tunables

use std::path::PathBuf;
use std::time::Duration;

use crate::hls::HlsConfig;

/// Configuration shared by the manager and every group it creates
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// GOP cache ring depth, clamped to [0, 8]; 0 disables the cache
    pub gop_cache_depth: usize,

    /// Soft subscriber queue capacity Q; the hard cap is 2Q
    pub subscriber_queue_capacity: usize,

    /// Output worker write deadline before eviction
    pub write_timeout: Duration,

    /// Empty groups are destroyed after this long
    pub group_idle_timeout: Duration,

    /// Jitter window for multi-track publishers
    pub reorder_window_ms: u64,

    /// Audio-only MPEG-TS fragment cut interval
    pub max_fragment_ms: u64,

    /// HLS output, disabled when `None`
    pub hls: Option<HlsConfig>,

    /// Directory for opt-in `<stream_name>.flv` recordings
    pub record_flv_dir: Option<PathBuf>,

    /// Pull URL template with `{stream}` placeholder, e.g.
    /// `rtmp://origin:1935/live/{stream}`
    pub pull_url_template: Option<String>,

    /// Static push URL templates with `{stream}` placeholder
    pub push_url_templates: Vec<String>,

    /// Publisher eviction threshold: this many dropped-message
    /// violations inside `violation_window`
    pub violation_threshold: usize,

    /// Window for `violation_threshold`
    pub violation_window: Duration,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            gop_cache_depth: 2,
            subscriber_queue_capacity: 256,
            write_timeout: Duration::from_secs(10),
            group_idle_timeout: Duration::from_secs(30),
            reorder_window_ms: 100,
            max_fragment_ms: 6000,
            hls: None,
            record_flv_dir: None,
            pull_url_template: None,
            push_url_templates: Vec::new(),
            violation_threshold: 16,
            violation_window: Duration::from_secs(10),
        }
    }
}

impl GroupConfig {
    /// Set the GOP cache depth
    pub fn gop_cache_depth(mut self, depth: usize) -> Self {
        self.gop_cache_depth = depth;
        self
    }

    /// Set the soft subscriber queue capacity
    pub fn subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity.max(1);
        self
    }

    /// Set the write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the idle timeout
    pub fn group_idle_timeout(mut self, timeout: Duration) -> Self {
        self.group_idle_timeout = timeout;
        self
    }

    /// Enable HLS output
    pub fn hls(mut self, config: HlsConfig) -> Self {
        self.hls = Some(config);
        self
    }

    /// Enable FLV recording into `dir`
    pub fn record_flv(mut self, dir: PathBuf) -> Self {
        self.record_flv_dir = Some(dir);
        self
    }

    /// Enable on-demand relay pull
    pub fn pull_url_template(mut self, template: impl Into<String>) -> Self {
        self.pull_url_template = Some(template.into());
        self
    }

    /// Add a static push target
    pub fn push_url_template(mut self, template: impl Into<String>) -> Self {
        self.push_url_templates.push(template.into());
        self
    }

    /// Expand a URL template for a stream name
    pub fn expand_template(template: &str, stream_name: &str) -> String {
        template.replace("{stream}", stream_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GroupConfig::default();
        assert_eq!(config.gop_cache_depth, 2);
        assert_eq!(config.subscriber_queue_capacity, 256);
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.group_idle_timeout, Duration::from_secs(30));
        assert_eq!(config.reorder_window_ms, 100);
        assert!(config.hls.is_none());
        assert!(config.pull_url_template.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let config = GroupConfig::default()
            .gop_cache_depth(4)
            .subscriber_queue_capacity(64)
            .group_idle_timeout(Duration::from_secs(5))
            .pull_url_template("rtmp://origin/live/{stream}");

        assert_eq!(config.gop_cache_depth, 4);
        assert_eq!(config.subscriber_queue_capacity, 64);
        assert_eq!(config.group_idle_timeout, Duration::from_secs(5));
        assert!(config.pull_url_template.is_some());
    }

    #[test]
    fn test_queue_capacity_floor() {
        let config = GroupConfig::default().subscriber_queue_capacity(0);
        assert_eq!(config.subscriber_queue_capacity, 1);
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(
            GroupConfig::expand_template("rtmp://origin/live/{stream}", "abc"),
            "rtmp://origin/live/abc"
        );
    }
}
