pub mod queue {
    use tokio::time::Duration;

    pub const RESERVE_TIMEOUT_SECS: u64 = 60;
    pub const RETRY_WAIT: Duration = Duration::from_secs(30);
    pub const PUT_PRIORITY: u32 = 0;
    pub const PUT_DELAY_SECS: u32 = 0;
    pub const PUT_TTR_SECS: u32 = 300;
}
