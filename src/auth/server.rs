//! Loopback listener for the OAuth redirect.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

/// Path the authorization server redirects to.
pub const CALLBACK_PATH: &str = "/callback";

/// Query parameters carried by a successful redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: String,
    pub state: String,
}

/// Single-use HTTP listener on `127.0.0.1` with an ephemeral port.
pub struct CallbackServer {
    port: u16,
    expected_state: String,
    listener: TcpListener,
}

impl CallbackServer {
    pub fn bind(expected_state: String) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        tracing::debug!("OAuth callback listener bound on port {port}");
        Ok(Self {
            port,
            expected_state,
            listener,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{CALLBACK_PATH}", self.port)
    }

    /// Block until the redirect arrives.
    ///
    /// With `timeout = None` this waits until the redirect arrives or the
    /// process is terminated.
    pub fn wait_for_callback(self, timeout: Option<Duration>) -> Result<CallbackResult> {
        let (tx, rx) = mpsc::channel();
        let expected_state = self.expected_state;
        let listener = self.listener;

        thread::spawn(move || {
            let _ = tx.send(Self::serve(&listener, &expected_state, timeout));
        });

        match timeout {
            Some(limit) => rx
                .recv_timeout(limit)
                .map_err(|_| Error::credential("Timed out waiting for the OAuth redirect"))?,
            None => rx
                .recv()
                .map_err(|_| Error::credential("OAuth callback listener stopped"))?,
        }
    }

    fn serve(
        listener: &TcpListener,
        expected_state: &str,
        timeout: Option<Duration>,
    ) -> Result<CallbackResult> {
        let start = Instant::now();

        loop {
            if timeout.is_some_and(|limit| start.elapsed() > limit) {
                return Err(Error::credential("Timed out waiting for the OAuth redirect"));
            }

            match listener.accept() {
                Ok((mut stream, _)) => {
                    // Accepted sockets inherit non-blocking mode on some platforms
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(Duration::from_secs(5)))?;

                    let mut buffer = [0u8; 4096];
                    let Ok(n) = stream.read(&mut buffer) else {
                        continue;
                    };
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let Some(target) = request_target(&request) else {
                        continue;
                    };

                    if !target.starts_with(CALLBACK_PATH) {
                        respond(&mut stream, "404 Not Found", "")?;
                        continue;
                    }

                    return match parse_callback(target, expected_state) {
                        Ok(result) => {
                            let body = page(
                                "Authorization complete",
                                "You can close this tab and return to the terminal.",
                            );
                            respond(&mut stream, "200 OK", &body)?;
                            Ok(result)
                        }
                        Err(e) => {
                            let body = page("Authorization failed", &html_escape(&e.to_string()));
                            respond(&mut stream, "400 Bad Request", &body)?;
                            Err(e)
                        }
                    };
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Request target of a `GET` request line.
fn request_target(request: &str) -> Option<&str> {
    let mut parts = request.lines().next()?.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Some(target),
        _ => None,
    }
}

fn parse_callback(target: &str, expected_state: &str) -> Result<CallbackResult> {
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| Error::credential(format!("Malformed OAuth redirect: {e}")))?;
    let params: HashMap<_, _> = url.query_pairs().collect();

    if let Some(error) = params.get("error") {
        return Err(match params.get("error_description") {
            Some(desc) => Error::credential(format!("Authorization denied: {error} ({desc})")),
            None => Error::credential(format!("Authorization denied: {error}")),
        });
    }

    let state = params
        .get("state")
        .ok_or_else(|| Error::credential("OAuth redirect is missing the state parameter"))?;
    if *state != expected_state {
        return Err(Error::credential(
            "State token does not match the expected state",
        ));
    }

    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::credential("OAuth redirect is missing the authorization code"))?;

    Ok(CallbackResult {
        code: code.to_string(),
        state: state.to_string(),
    })
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\
         <body style=\"font-family: system-ui, sans-serif; text-align: center; padding: 50px;\">\
         <h1>{title}</h1><p>{message}</p></body></html>"
    )
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
