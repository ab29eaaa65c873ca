use std::time::Duration;

/// Where the shared connection currently is in its lifecycle.
/// UI code observes this instead of catching transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Checking server liveness before attempting the transport.
    Probing,
    /// Opening the WebSocket, with bounded attempts.
    Connecting,
    /// Transport open and the session re-identified.
    Connected,
    /// Transport lost or attempts exhausted; a return to Probing is scheduled.
    Disconnected,
}

/// Fixed-delay reconnection policy. Delays are fixed with a minimum and a
/// maximum bound, not exponential; infinite eventual retry comes from the
/// outer probe loop, not from the connect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Timeout for one liveness probe request.
    pub probe_timeout: Duration,
    /// Delay between failed probes.
    pub probe_retry_delay: Duration,
    /// Transport connect attempts per cycle before giving up to Disconnected.
    pub connect_attempts: u32,
    /// Delay between transport connect attempts.
    pub connect_retry_delay: Duration,
    /// Delay in Disconnected before returning to Probing.
    pub reconnect_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            probe_retry_delay: Duration::from_secs(5),
            connect_attempts: 5,
            connect_retry_delay: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}
