//! Command dispatch for the `promptpos` binary.

use clap::Parser;
use dotenvy::dotenv;
use promptpos_types::promptpay::{self, PromptPay, PromptPayError, PromptPayTarget, TlvReader};
use promptpos_types::session::TokenPair;
use promptpos_types::util::BahtAmount;

use crate::config::{Cli, Command, Config, SessionCommand};
use crate::telemetry::Telemetry;
use crate::terminal::{KeepaliveExit, SessionStatus, Terminal};
use crate::util::SigDown;

/// Parses the command line, sets up logging and runs one command.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let cli = Cli::parse();
    match cli.command {
        Command::Qr { target, amount } => {
            println!("{}", qr_payload(&target, amount)?);
        }
        Command::Verify { payload } => {
            for line in describe_payload(&payload)? {
                println!("{line}");
            }
            println!("OK");
        }
        Command::Session(command) => {
            let terminal = Terminal::from_config(&Config::load_from_path(&cli.config)?)?;
            run_session(&terminal, command).await?;
        }
        Command::Get { path } => {
            let terminal = Terminal::from_config(&Config::load_from_path(&cli.config)?)?;
            let (status, body) = terminal.get(&path).await?;
            tracing::info!(%status, "GET {path}");
            println!("{body}");
        }
        Command::Keepalive => {
            let terminal = Terminal::from_config(&Config::load_from_path(&cli.config)?)?;
            let sig_down = SigDown::try_new()?;
            let exit = terminal.keepalive(sig_down.cancellation_token()).await?;
            match exit {
                KeepaliveExit::NoSession => {
                    return Err("No stored session, import one with `session import`".into());
                }
                KeepaliveExit::Shutdown => {
                    tracing::info!(signal = ?sig_down.received(), "Shutting down");
                }
                KeepaliveExit::SessionEnded => {
                    return Err("Session ended, sign in again".into());
                }
            }
        }
    }
    Ok(())
}

async fn run_session(
    terminal: &Terminal,
    command: SessionCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        SessionCommand::Import {
            access_token,
            refresh_token,
        } => {
            let expires_at = terminal
                .import(TokenPair::new(access_token, refresh_token))
                .await?;
            println!("Session stored, access token valid until {expires_at}");
        }
        SessionCommand::Status => match terminal.status().await? {
            SessionStatus::SignedOut => println!("Signed out"),
            SessionStatus::Active {
                expires_at,
                expires_in,
            } => match expires_at {
                Some(at) => println!(
                    "Signed in, access token expires at {at} (in {}s)",
                    expires_in.as_secs()
                ),
                None => println!("Signed in, expiry unknown"),
            },
        },
        SessionCommand::Refresh => {
            terminal.refresh().await?;
            println!("Access token refreshed");
        }
        SessionCommand::Logout => {
            terminal.logout().await;
            println!("Signed out");
        }
    }
    Ok(())
}

/// The payload for `target`, with tag 54 only when an amount is given.
pub fn qr_payload(target: &str, amount: Option<BahtAmount>) -> Result<String, PromptPayError> {
    match amount {
        Some(amount) => promptpay::encode(target, amount),
        None => Ok(PromptPay::new(PromptPayTarget::parse(target)?).encode()),
    }
}

/// Verifies `payload` and lists its fields, one `tag len value` line each.
pub fn describe_payload(payload: &str) -> Result<Vec<String>, PromptPayError> {
    promptpay::verify(payload)?;
    let mut lines = Vec::new();
    for field in TlvReader::new(payload) {
        let field = field?;
        lines.push(format!("{} {:02} {}", field.tag, field.value.len(), field.value));
        if field.tag == "29" {
            for nested in field.nested() {
                let nested = nested?;
                lines.push(format!(
                    "  {} {:02} {}",
                    nested.tag,
                    nested.value.len(),
                    nested.value
                ));
            }
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_payload_with_amount() {
        let payload = qr_payload("081-234-5678", Some(BahtAmount::from(100))).unwrap();
        assert_eq!(
            payload,
            "00020101021129370016A0000006770101110113006681234567853037645406100.005802TH63045169"
        );
    }

    #[test]
    fn test_qr_payload_open_amount() {
        let payload = qr_payload("0812345678", None).unwrap();
        assert_eq!(
            payload,
            "00020101021129370016A0000006770101110113006681234567853037645802TH6304823E"
        );
    }

    #[test]
    fn test_qr_payload_rejects_short_target() {
        assert!(matches!(
            qr_payload("12345", None),
            Err(PromptPayError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_describe_lists_nested_fields() {
        let lines = describe_payload(
            "00020101021129370016A000000677010111021312345678901235303764540512.505802TH6304593B",
        )
        .unwrap();
        assert_eq!(lines[0], "00 02 01");
        assert_eq!(lines[2], "29 37 0016A00000067701011102131234567890123");
        assert_eq!(lines[3], "  00 16 A000000677010111");
        assert_eq!(lines[4], "  02 13 1234567890123");
        assert_eq!(lines.last().map(String::as_str), Some("63 04 593B"));
    }

    #[test]
    fn test_describe_rejects_tampered_payload() {
        assert!(matches!(
            describe_payload(
                "00020101021129370016A0000006770101110113006681234567853037645406900.005802TH63045169"
            ),
            Err(PromptPayError::ChecksumMismatch { .. })
        ));
    }
}
