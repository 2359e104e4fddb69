// ABOUTME: Example application demonstrating the SMSC-side server facade
// ABOUTME: Accepts binds from any ESME and answers submit_sm with a generated message id

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use argh::FromArgs;
use smpp::client::types::BindType;
use smpp::datatypes::{CommandStatus, MessageId, SubmitSm, SubmitSmResponse};
use smpp::server::{ServerBuilder, ServerOptions};
use smpp::session::{AuthOutcome, Authenticator, SessionHandler};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Example SMSC server: accepts any bind and echoes back a generated message id for every submit_sm
#[derive(FromArgs)]
struct CliArgs {
    /// interface to listen on (default: 0.0.0.0)
    #[argh(option)]
    host: Option<String>,

    /// port to listen on (default: 2775)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// required system_id for a bind to be accepted; empty accepts any
    #[argh(option)]
    system_id: Option<String>,

    /// required password for a bind to be accepted; empty accepts any
    #[argh(option)]
    password: Option<String>,
}

/// A minimal SMSC handler: accepts submit_sm for any bound session and
/// assigns each one a monotonically increasing message id.
struct EchoSmsc {
    system_id: Option<String>,
    password: Option<String>,
    next_message_id: AtomicU64,
}

impl SessionHandler for EchoSmsc {
    fn handle_submit_sm(
        &self,
        pdu: SubmitSm,
    ) -> impl Future<Output = SubmitSmResponse> + Send {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        async move {
            tracing::info!(
                source = %pdu.source_addr,
                dest = %pdu.destination_addr,
                bytes = pdu.short_message.len(),
                "submit_sm accepted"
            );
            let message_id = MessageId::from(format!("{id:08X}").as_str());
            SubmitSmResponse::success(pdu.sequence_number, message_id)
        }
    }

    fn session_bound(
        &self,
        system_id: &str,
        bind_type: BindType,
    ) -> impl Future<Output = ()> + Send {
        let system_id = system_id.to_string();
        async move {
            tracing::info!(%system_id, ?bind_type, "session bound");
        }
    }

    fn session_closed(&self, system_id: &str) -> impl Future<Output = ()> + Send {
        let system_id = system_id.to_string();
        async move {
            tracing::info!(%system_id, "session closed");
        }
    }
}

impl Authenticator for EchoSmsc {
    fn authenticate(
        &self,
        system_id: &str,
        password: Option<&str>,
        _system_type: &str,
        _bind_type: BindType,
    ) -> impl Future<Output = AuthOutcome> + Send {
        let accepted = self
            .system_id
            .as_deref()
            .map(|expected| expected == system_id)
            .unwrap_or(true)
            && self
                .password
                .as_deref()
                .map(|expected| Some(expected) == password)
                .unwrap_or(true);

        async move {
            if accepted {
                AuthOutcome::Accepted
            } else {
                AuthOutcome::Rejected(CommandStatus::InvalidPassword)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = cli_args.host.unwrap_or_else(|| "0.0.0.0".to_owned());
    let port = cli_args.port.unwrap_or(2775);

    let options = ServerOptions::new(host.clone(), port).with_system_id("demo-smsc");

    let handler = EchoSmsc {
        system_id: cli_args.system_id,
        password: cli_args.password,
        next_message_id: AtomicU64::new(1),
    };

    let server = ServerBuilder::start(options, handler).await?;
    println!("listening on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    println!("shutting down");
    server.stop().await;

    Ok(())
}
