//! OCPP Link Node - CLI for one simulated charge point
//!
//! Connects to a CSMS, registers with BootNotification, keeps the heartbeat
//! going and answers a few CSMS-initiated calls.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! ocpp-link-node --station CP-001
//!
//! # Connect to specific CSMS and authorize a tag once registered
//! ocpp-link-node --station CP-001 \
//!     --csms-url ws://localhost:8180/steve/websocket/CentralSystemService \
//!     --id-tag TAG-0001
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use clap::Parser;
use ocpp_link::ocpp::{
    generate_id_tag, AuthorizeResponse, AvailabilityStatus, ChangeAvailability,
    ChangeAvailabilityResponse, ChargePointStatus, ErrorCode, MessageObserved, MessageTrigger,
    ProtocolError, StatusNotification, TriggerMessage, TriggerMessageResponse,
    TriggerMessageStatus,
};
use ocpp_link::{ClientConfig, Connection, OcppClient};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Simulated OCPP 1.6 charge point
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OCPP CSMS WebSocket URL
    #[arg(long, default_value = "ws://localhost:8180/steve/websocket/CentralSystemService")]
    csms_url: String,

    /// OCPP station ID
    #[arg(short, long, default_value = "CP-001")]
    station: String,

    /// Vendor name
    #[arg(long, default_value = "SimulareVendor")]
    vendor: String,

    /// Model name
    #[arg(long, default_value = "ModelForPSUCapstone")]
    model: String,

    /// idTag to authorize once registered ("auto" generates one)
    #[arg(long)]
    id_tag: Option<String>,

    /// Heartbeat interval until the CSMS assigns one (seconds)
    #[arg(long, default_value = "240")]
    heartbeat_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let id_tag = args.id_tag.as_deref().map(|tag| match tag {
        "auto" => generate_id_tag(),
        tag => tag.to_string(),
    });

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║            OCPP Link Node - Simulated Charge Point           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Station:  {:<50} ║", args.station);
    println!("║  CSMS URL: {:<50} ║", truncate(&args.csms_url, 50));
    println!("║  Vendor:   {:<50} ║", truncate(&args.vendor, 50));
    println!("║  Model:    {:<50} ║", truncate(&args.model, 50));
    println!("║  idTag:    {:<50} ║", id_tag.as_deref().unwrap_or("-"));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // Build configuration
    let mut config = ClientConfig::new(&args.station, &args.csms_url)
        .with_vendor(&args.vendor, &args.model)
        .with_heartbeat_interval(Duration::from_secs(args.heartbeat_secs));
    if let Some(tag) = id_tag {
        config = config.with_id_tag(tag);
    }

    let client = OcppClient::new(config);
    register_observers(&client.connection());

    info!("Starting OCPP link node...");

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

/// Answer the CSMS calls this node supports
fn register_observers(connection: &Arc<Connection>) {
    let observers = connection.observers();

    observers.subscribe(|response: &AuthorizeResponse, observed: &MessageObserved| {
        info!(
            "Authorize [{}]: {}",
            observed.correlation_id, response.id_tag_info.status
        );
    });

    observers.subscribe(|error: &ProtocolError, observed: &MessageObserved| {
        warn!("CALLERROR [{}]: {}", observed.correlation_id, error);
    });

    let weak = Arc::downgrade(connection);
    observers.subscribe(move |request: &ChangeAvailability, observed: &MessageObserved| {
        info!(
            "ChangeAvailability connector {} -> {}",
            request.connector_id, request.availability
        );
        reply(&weak, observed, |conn| {
            conn.respond(
                &observed.correlation_id,
                &ChangeAvailabilityResponse {
                    status: AvailabilityStatus::Accepted,
                },
            )
        });
    });

    let weak = Arc::downgrade(connection);
    observers.subscribe(move |request: &TriggerMessage, observed: &MessageObserved| {
        let connector_id = request.connector_id.unwrap_or(0);
        reply(&weak, observed, |conn| match request.requested_message {
            MessageTrigger::StatusNotification => {
                conn.respond(
                    &observed.correlation_id,
                    &TriggerMessageResponse {
                        status: TriggerMessageStatus::Accepted,
                    },
                )?;
                conn.send(&StatusNotification::new(connector_id, ChargePointStatus::Available))
                    .map(|_| ())
            }
            other => {
                info!("TriggerMessage {} not implemented", other);
                conn.respond(
                    &observed.correlation_id,
                    &TriggerMessageResponse {
                        status: TriggerMessageStatus::NotImplemented,
                    },
                )
            }
        });
    });
}

fn reply<F>(connection: &Weak<Connection>, observed: &MessageObserved, respond: F)
where
    F: FnOnce(&Connection) -> Result<(), ocpp_link::OcppError>,
{
    let Some(conn) = connection.upgrade() else {
        return;
    };
    if let Err(e) = respond(&conn) {
        error!("Failed to answer {} [{}]: {}", observed.descriptor, observed.correlation_id, e);
        if let Err(e) =
            conn.respond_error(&observed.correlation_id, ErrorCode::InternalError, e.to_string())
        {
            error!("Failed to queue CALLERROR [{}]: {}", observed.correlation_id, e);
        }
    }
}

/// Truncate string with ellipsis, counting characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate("ws://short", 50), "ws://short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_truncate_multibyte() {
        let vendor = format!("{}{}", "a".repeat(46), "é".repeat(4));
        assert_eq!(truncate(&vendor, 50), vendor);

        let longer = format!("{}{}", "a".repeat(46), "é".repeat(8));
        let cut = truncate(&longer, 50);
        assert_eq!(cut.chars().count(), 50);
        assert_eq!(cut, format!("{}é...", "a".repeat(46)));
    }
}
