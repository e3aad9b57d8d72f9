use std::time::Duration;

/// Client options
#[derive(Clone, Debug)]
pub struct Opts {
    /// Root of the REST API. Defaults to `http://localhost:5000/api/v1`
    base_url: String,
    /// Number of posts per list page. Defaults to 6
    page_size: u32,
    /// Maximum time to wait for a response. Defaults to 30 seconds
    request_timeout: Duration,
    /// How long fetched data counts as fresh for `ensure`. Defaults to 0
    stale_time: Duration,
    /// Buffer of the cache event channel. Defaults to 64
    event_capacity: usize,
}

impl Opts {
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        let mut opts = self;
        opts.base_url = base_url.into();
        opts
    }

    pub fn page_size(self, page_size: u32) -> Self {
        let mut opts = self;
        // a page size of zero would make every list empty
        opts.page_size = page_size.max(1);
        opts
    }

    pub fn request_timeout(self, request_timeout: Duration) -> Self {
        let mut opts = self;
        opts.request_timeout = request_timeout;
        opts
    }

    pub fn stale_time(self, stale_time: Duration) -> Self {
        let mut opts = self;
        opts.stale_time = stale_time;
        opts
    }

    pub fn event_capacity(self, event_capacity: usize) -> Self {
        let mut opts = self;
        opts.event_capacity = event_capacity.max(1);
        opts
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get_page_size(&self) -> u32 {
        self.page_size
    }

    pub fn get_request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn get_stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn get_event_capacity(&self) -> usize {
        self.event_capacity
    }
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            base_url: "http://localhost:5000/api/v1".to_string(),
            page_size: 6,
            request_timeout: Duration::from_secs(30),
            stale_time: Duration::ZERO,
            event_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_overrides_defaults() {
        let opts = Opts::default()
            .base_url("https://api.example.com")
            .page_size(0)
            .stale_time(Duration::from_secs(5));

        assert_eq!(opts.get_base_url(), "https://api.example.com");
        assert_eq!(opts.get_page_size(), 1);
        assert_eq!(opts.get_stale_time(), Duration::from_secs(5));
        assert_eq!(opts.get_request_timeout(), Duration::from_secs(30));
    }
}
