use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

use crate::config::AppConfig;
use crate::sync::fields::FieldMapping;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP bridge. Flags override the configured listen address.
    Serve {
        host: Option<String>,
        port: Option<u16>,
    },
    /// Print the task project's custom field schema.
    Fields,
    Help,
}

/// Parse arguments after the binary name.
///
/// Supported forms:
///   deskbridge
///   deskbridge serve --port 9000
///   deskbridge serve --host 127.0.0.1 -p 9000
///   deskbridge fields
pub fn parse_args(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Serve {
            host: None,
            port: None,
        });
    };

    match command.as_str() {
        "serve" => parse_serve_args(rest),
        "fields" => {
            if let Some(extra) = rest.first() {
                bail!("Unexpected argument for fields: {extra}");
            }
            Ok(Command::Fields)
        }
        "help" | "-h" | "--help" => Ok(Command::Help),
        other => bail!("Unknown command: {other}\n\nRun `deskbridge help` for usage."),
    }
}

fn parse_serve_args(args: &[String]) -> Result<Command> {
    let mut host = None;
    let mut port = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("Missing value for --host flag");
                };
                host = Some(value.clone());
            }
            "-p" | "--port" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    bail!("Missing value for -p/--port flag");
                };
                let parsed = value
                    .parse::<u16>()
                    .with_context(|| format!("Invalid port: {value}"))?;
                port = Some(parsed);
            }
            other => bail!("Unexpected argument for serve: {other}"),
        }
        i += 1;
    }

    Ok(Command::Serve { host, port })
}

/// Resolve the listen address; hostnames such as `localhost` are looked up.
pub async fn listen_addr(
    config: &AppConfig,
    host: Option<&str>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    let host = host.unwrap_or(&config.server.host);
    let port = port.unwrap_or(config.server.port);
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Invalid listen address {host}:{port}"))?
        .next()
        .with_context(|| format!("No address found for {host}:{port}"))
}

/// One line per field, critical fields flagged.
pub fn render_fields(mapping: &FieldMapping) -> String {
    if mapping.is_empty() {
        return "No custom fields found for the configured project.".to_string();
    }
    let ticket = mapping.ticket_field().map(|f| f.id.as_str());
    let status = mapping.status_field().map(|f| f.id.as_str());

    let mut lines = Vec::with_capacity(mapping.len() + 2);
    for field in mapping.sorted() {
        let marker = if Some(field.id.as_str()) == ticket {
            "  [ticket link]"
        } else if Some(field.id.as_str()) == status {
            "  [status]"
        } else {
            ""
        };
        lines.push(format!(
            "{:<32} {:<20} {}{marker}",
            field.name,
            field.kind.to_string(),
            field.id
        ));
    }
    if ticket.is_none() {
        lines.push("warning: ticket link field not found".to_string());
    }
    if status.is_none() {
        lines.push("warning: status field not found".to_string());
    }
    lines.join("\n")
}

pub fn print_help() {
    println!("deskbridge: keeps Intercom tickets and Asana tasks in sync\n");
    println!("USAGE:");
    println!("  deskbridge                 Start the webhook server");
    println!("  deskbridge serve [flags]   Start the webhook server");
    println!("  deskbridge fields          List the Asana project's custom fields");
    println!("  deskbridge help            Show this message");
    println!();
    println!("SERVE OPTIONS:");
    println!("  --host <addr>      Listen address (default from config, 0.0.0.0)");
    println!("  -p, --port <port>  Listen port (default from config, 8080)");
    println!();
    println!("CONFIG:");
    println!("  ~/.deskbridge/config.toml, or the path in DESKBRIDGE_CONFIG");
}
