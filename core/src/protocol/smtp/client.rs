/*
 * client.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, a store-and-forward mail relay.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! The forwarding leg of the relay: an async SMTP client that connects to
//! the upstream server, negotiates EHLO and STARTTLS, authenticates with
//! the SASL client engine (walking the mechanism list on failure), and
//! sends the spooled message with MAIL/RCPT/DATA.

use std::io;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::auth::{SaslClient, SecretsFile};
use crate::net::UpstreamStream;
use crate::protocol::smtp::dot_stuffing;

/// An initial response longer than this is withheld and sent on the
/// server's empty challenge instead (keeps the AUTH command line short).
const INITIAL_RESPONSE_LIMIT: usize = 450;

/// Forwarding client error (network, protocol, auth).
#[derive(Debug)]
pub struct SmtpClientError {
    pub message: String,
}

impl SmtpClientError {
    fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl std::fmt::Display for SmtpClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SmtpClientError {}

impl From<io::Error> for SmtpClientError {
    fn from(e: io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Parsed SMTP response (code plus all lines of a multi-line reply).
struct SmtpResponse {
    code: u16,
    lines: Vec<String>,
}

impl SmtpResponse {
    fn message(&self) -> &str {
        self.lines.last().map(|s| s.as_str()).unwrap_or("")
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

async fn read_response<S>(stream: &mut S, buf: &mut Vec<u8>) -> io::Result<SmtpResponse>
where
    S: AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    loop {
        buf.clear();
        loop {
            let mut b = [0u8; 1];
            let n = stream.read(&mut b).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                ));
            }
            buf.push(b[0]);
            if buf.ends_with(b"\r\n") {
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf[..buf.len() - 2]).to_string();
        if line.len() >= 3 {
            let code: u16 = line[..3].parse().unwrap_or(0);
            let continuation = line.as_bytes().get(3) == Some(&b'-');
            let text = line.get(4..).unwrap_or("").trim().to_string();
            lines.push(text);
            if !continuation {
                return Ok(SmtpResponse { code, lines });
            }
        }
    }
}

async fn write_line<S>(stream: &mut S, line: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await?;
    stream.flush().await?;
    Ok(())
}

/// Send EHLO; return (starttls, advertised auth mechanisms).
async fn ehlo<S>(
    stream: &mut S,
    read_buf: &mut Vec<u8>,
    ehlo_hostname: &str,
) -> Result<(bool, Vec<String>), SmtpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_line(stream, &format!("EHLO {}", ehlo_hostname)).await?;
    let r = read_response(stream, read_buf).await?;
    if !r.is_success() {
        return Err(SmtpClientError::new(format!(
            "EHLO failed: {} {}",
            r.code,
            r.message()
        )));
    }
    let mut starttls = false;
    let mut mechanisms = Vec::new();
    for line in &r.lines {
        let upper = line.to_uppercase();
        if upper == "STARTTLS" {
            starttls = true;
        } else if let Some(rest) = upper.strip_prefix("AUTH ") {
            mechanisms.extend(rest.split_whitespace().map(str::to_string));
        }
    }
    Ok((starttls, mechanisms))
}

/// Run the AUTH dialog, walking the client's mechanism list until one
/// succeeds or the list is exhausted. The caller has already called
/// [`SaslClient::select_mechanism`] with the server's advertisement.
async fn authenticate<S>(
    stream: &mut S,
    read_buf: &mut Vec<u8>,
    sasl: &mut SaslClient<'_>,
    selector: &str,
) -> Result<(), SmtpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut mechanism = sasl.mechanism();
    if mechanism.is_empty() {
        return Err(SmtpClientError::new("no usable authentication mechanism"));
    }
    'mechanism: loop {
        let initial = sasl.initial_response(selector, INITIAL_RESPONSE_LIMIT);
        let command = if initial.data.is_empty() {
            format!("AUTH {}", mechanism)
        } else {
            format!("AUTH {} {}", mechanism, BASE64.encode(&initial.data))
        };
        write_line(stream, &command).await?;

        loop {
            let r = read_response(stream, read_buf).await?;
            match r.code {
                235 => {
                    log::info!("authenticated with remote server {}", sasl.info());
                    return Ok(());
                }
                334 => {
                    let challenge = BASE64
                        .decode(r.message().trim())
                        .map_err(|_| SmtpClientError::new("bad challenge base64"))?;
                    let rsp = sasl.response(&mechanism, &challenge, selector);
                    if rsp.error {
                        // abort this mechanism and let the server fail it
                        write_line(stream, "*").await?;
                        let _ = read_response(stream, read_buf).await?;
                        break;
                    }
                    if !rsp.sensitive {
                        log::debug!(
                            "auth response: [{}]",
                            String::from_utf8_lossy(&rsp.data)
                        );
                    }
                    write_line(stream, &BASE64.encode(&rsp.data)).await?;
                }
                _ => break,
            }
        }

        log::warn!(
            "authentication with mechanism [{}] failed",
            mechanism.to_lowercase()
        );
        if !sasl.next() {
            return Err(SmtpClientError::new("authentication failed"));
        }
        mechanism = sasl.mechanism();
        continue 'mechanism;
    }
}

/// MAIL FROM, RCPT TO, DATA with dot stuffing.
async fn send_transaction<S>(
    stream: &mut S,
    read_buf: &mut Vec<u8>,
    mail_from: &str,
    rcpt_to: &[String],
    message: &[u8],
) -> Result<(), SmtpClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_line(stream, &format!("MAIL FROM:<{}>", mail_from)).await?;
    let r = read_response(stream, read_buf).await?;
    if !r.is_success() {
        return Err(SmtpClientError::new(format!(
            "MAIL FROM failed: {} {}",
            r.code,
            r.message()
        )));
    }
    if rcpt_to.is_empty() {
        return Err(SmtpClientError::new("no recipients"));
    }
    for rcpt in rcpt_to {
        write_line(stream, &format!("RCPT TO:<{}>", rcpt)).await?;
        let r = read_response(stream, read_buf).await?;
        if !r.is_success() && r.code != 251 && r.code != 252 {
            return Err(SmtpClientError::new(format!(
                "RCPT TO failed: {} {}",
                r.code,
                r.message()
            )));
        }
    }
    write_line(stream, "DATA").await?;
    let r = read_response(stream, read_buf).await?;
    if r.code != 354 {
        return Err(SmtpClientError::new(format!(
            "DATA not accepted: {} {}",
            r.code,
            r.message()
        )));
    }
    stream.write_all(&dot_stuffing::stuff(message)).await?;
    stream.flush().await?;
    let r = read_response(stream, read_buf).await?;
    if !r.is_success() {
        return Err(SmtpClientError::new(format!(
            "message rejected: {} {}",
            r.code,
            r.message()
        )));
    }
    Ok(())
}

/// One forwarding session over an established stream: greeting, EHLO,
/// optional STARTTLS upgrade and re-EHLO, AUTH when the secrets require
/// it, then the message transaction and QUIT.
pub async fn forward_message(
    mut stream: UpstreamStream,
    host: &str,
    use_starttls: bool,
    secrets: &SecretsFile,
    sasl_config: &str,
    selector: &str,
    ehlo_hostname: &str,
    mail_from: &str,
    rcpt_to: &[String],
    message: &[u8],
) -> Result<(), SmtpClientError> {
    let mut read_buf = Vec::with_capacity(4096);

    let r = read_response(&mut stream, &mut read_buf).await?;
    if r.code != 220 {
        return Err(SmtpClientError::new(format!(
            "expected 220 greeting, got {} {}",
            r.code,
            r.message()
        )));
    }
    let (starttls, mut mechanisms) = ehlo(&mut stream, &mut read_buf, ehlo_hostname).await?;

    if starttls && use_starttls && !stream.is_tls() {
        write_line(&mut stream, "STARTTLS").await?;
        let r = read_response(&mut stream, &mut read_buf).await?;
        if r.code != 220 {
            return Err(SmtpClientError::new(format!(
                "STARTTLS failed: {} {}",
                r.code,
                r.message()
            )));
        }
        stream = stream.upgrade_to_tls(host).await?;
        let (_, tls_mechanisms) = ehlo(&mut stream, &mut read_buf, ehlo_hostname).await?;
        mechanisms = tls_mechanisms;
    }

    let mut sasl = SaslClient::new(secrets, sasl_config);
    if sasl.must_authenticate(selector) {
        sasl.select_mechanism(&mechanisms, selector);
        authenticate(&mut stream, &mut read_buf, &mut sasl, selector).await?;
    }

    send_transaction(&mut stream, &mut read_buf, mail_from, rcpt_to, message).await?;

    write_line(&mut stream, "QUIT").await?;
    let _ = read_response(&mut stream, &mut read_buf).await;
    Ok(())
}

/// As [`forward_message`] but doing the connect as well.
pub async fn connect_and_forward(
    host: &str,
    port: u16,
    use_implicit_tls: bool,
    use_starttls: bool,
    secrets: &SecretsFile,
    sasl_config: &str,
    selector: &str,
    ehlo_hostname: &str,
    mail_from: &str,
    rcpt_to: &[String],
    message: &[u8],
) -> Result<(), SmtpClientError> {
    let stream = if use_implicit_tls {
        UpstreamStream::connect_tls(host, port).await?
    } else {
        UpstreamStream::connect(host, port).await?
    };
    forward_message(
        stream,
        host,
        use_starttls,
        secrets,
        sasl_config,
        selector,
        ehlo_hostname,
        mail_from,
        rcpt_to,
        message,
    )
    .await
}
