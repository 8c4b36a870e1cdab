use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use msgchain::{HmiCorrelationId, RequestControllerConfig};

/// Runtime configuration for the `msgchain-broker` binary.
///
/// These settings control admission, timeouts and buffering of the broker.
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honored), with defaults suitable for a single head unit.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "msgchain-broker",
    version,
    about = "Fans mobile requests out to HMI requests and answers once every leg has responded"
)]
pub struct CliArgs {
    /// Maximum number of outstanding mobile requests per application.
    ///
    /// An application exceeding this is unregistered and notified with a
    /// `TOO_MANY_REQUESTS` reason.
    ///
    /// Environment variable: `MAX_REQUESTS_PER_APP`
    #[arg(long, env = "MAX_REQUESTS_PER_APP", default_value_t = 1000)]
    pub max_requests_per_app: usize,

    /// Timeout applied to mobile requests that carry none, in milliseconds.
    ///
    /// Zero disables the default timeout.
    ///
    /// Environment variable: `DEFAULT_TIMEOUT_MS`
    #[arg(long, env = "DEFAULT_TIMEOUT_MS", default_value_t = 10_000)]
    pub default_timeout_ms: u64,

    /// How often timed-out requests are swept, in milliseconds.
    ///
    /// Environment variable: `SWEEP_INTERVAL_MS`
    #[arg(long, env = "SWEEP_INTERVAL_MS", default_value_t = 100)]
    pub sweep_interval_ms: u64,

    /// Capacity of each pipeline's inbound channel and of the outbound
    /// channel.
    ///
    /// Environment variable: `CHANNEL_BUFFER_SIZE`
    #[arg(long, env = "CHANNEL_BUFFER_SIZE", default_value_t = 1024)]
    pub channel_buffer_size: usize,

    /// Seconds to wait for pipelines to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Largest HMI correlation id handed out before wrapping to zero.
    ///
    /// Environment variable: `MAX_HMI_CORRELATION_ID`
    #[arg(long, env = "MAX_HMI_CORRELATION_ID", default_value_t = HmiCorrelationId::MAX)]
    pub max_hmi_correlation_id: HmiCorrelationId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub max_requests_per_app: usize,
    pub default_timeout: Duration,
    pub sweep_interval: Duration,
    pub channel_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub max_hmi_correlation_id: HmiCorrelationId,
}

impl BrokerConfig {
    /// Limits handed to the request controller.
    pub const fn request_controller(&self) -> RequestControllerConfig {
        RequestControllerConfig {
            max_requests_per_connection: self.max_requests_per_app,
            default_timeout: self.default_timeout,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let controller = RequestControllerConfig::default();
        Self {
            max_requests_per_app: controller.max_requests_per_connection,
            default_timeout: controller.default_timeout,
            sweep_interval: Duration::from_millis(100),
            channel_buffer_size: 1024,
            shutdown_timeout: Duration::from_secs(3),
            max_hmi_correlation_id: HmiCorrelationId::MAX,
        }
    }
}

impl TryFrom<CliArgs> for BrokerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_requests_per_app == 0 {
            bail!("MAX_REQUESTS_PER_APP must be greater than 0");
        }

        if args.sweep_interval_ms == 0 {
            bail!("SWEEP_INTERVAL_MS must be greater than 0");
        }

        if args.channel_buffer_size == 0 {
            bail!("CHANNEL_BUFFER_SIZE must be greater than 0");
        }

        // A ceiling of zero would hand out the same id to every leg.
        if args.max_hmi_correlation_id == 0 {
            bail!("MAX_HMI_CORRELATION_ID must be greater than 0");
        }

        Ok(Self {
            max_requests_per_app: args.max_requests_per_app,
            default_timeout: Duration::from_millis(args.default_timeout_ms),
            sweep_interval: Duration::from_millis(args.sweep_interval_ms),
            channel_buffer_size: args.channel_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            max_hmi_correlation_id: args.max_hmi_correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<BrokerConfig> {
        let argv = core::iter::once("msgchain-broker").chain(args.iter().copied());
        let args = CliArgs::try_parse_from(argv)?;
        BrokerConfig::try_from(args)
    }

    #[test]
    fn defaults_match_library_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, BrokerConfig::default());
        assert_eq!(config.request_controller(), RequestControllerConfig::default());
    }

    #[test]
    fn flags_are_converted_to_durations() {
        let config = parse(&[
            "--default-timeout-ms",
            "250",
            "--sweep-interval-ms",
            "5",
            "--shutdown-timeout-secs",
            "1",
            "--max-hmi-correlation-id",
            "65535",
        ])
        .unwrap();

        assert_eq!(config.default_timeout, Duration::from_millis(250));
        assert_eq!(config.sweep_interval, Duration::from_millis(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.max_hmi_correlation_id, 65535);
    }

    #[test]
    fn zero_limits_are_rejected() {
        for flag in [
            "--max-requests-per-app",
            "--sweep-interval-ms",
            "--channel-buffer-size",
            "--max-hmi-correlation-id",
        ] {
            let err = parse(&[flag, "0"]).unwrap_err();
            assert!(err.to_string().contains("must be greater than 0"), "{flag}: {err}");
        }
    }
}
