//! Wire-level PostgreSQL replication client.
//!
//! Speaks just enough of the frontend/backend protocol to open a connection
//! in logical-replication mode, enter CopyBoth streaming against a slot, and
//! exchange WAL data for standby status updates. Cleartext and MD5 password
//! authentication are supported; SCRAM is reported as an authentication
//! error.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};
use postgres_protocol::message::{backend, frontend};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use url::Url;

use crate::error::{CdcError, Result};

/// Maximum wait for the initial TCP connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for WAL data before yielding an [`WalFrame::Idle`] so the
/// caller can observe cancellation.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Seconds between the Unix epoch and the PostgreSQL timestamp epoch
/// (2000-01-01 00:00:00 UTC).
const PG_EPOCH_UNIX_SECS: u64 = 946_684_800;

/// A connection established in replication mode, ready to issue
/// `START_REPLICATION`.
pub struct ReplicationClient {
    stream: BufReader<TcpStream>,
}

/// One frame read from the replication copy stream.
#[derive(Debug)]
pub enum WalFrame {
    /// XLogData: an output-plugin payload starting at `start_lsn`.
    XLogData { start_lsn: u64, payload: Bytes },
    /// Server keepalive; `reply_requested` asks for an immediate status
    /// update.
    Keepalive { wal_end: u64, reply_requested: bool },
    /// No data arrived within the poll interval.
    Idle,
    /// The server ended the copy stream.
    Closed,
}

impl ReplicationClient {
    /// Open a connection in logical-replication mode
    /// (`replication=database`), authenticating as the URL's user.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = Url::parse(database_url)
            .map_err(|e| CdcError::Config(format!("invalid database URL: {e}")))?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        let port = url.port().unwrap_or(5432);
        let user = match url.username() {
            "" => "postgres".to_string(),
            name => name.to_string(),
        };
        let password = url.password().map(str::to_string);
        let database = match url.path().trim_start_matches('/') {
            "" => "postgres".to_string(),
            name => name.to_string(),
        };

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| CdcError::Connection(format!("timed out connecting to {host}:{port}")))?
            .map_err(|e| CdcError::Connection(format!("{host}:{port}: {e}")))?;
        let mut stream = BufReader::new(stream);

        let params = vec![
            ("user", user.as_str()),
            ("database", database.as_str()),
            ("replication", "database"),
        ];
        let mut buf = BytesMut::new();
        frontend::startup_message(params.into_iter(), &mut buf)?;
        stream.write_all(&buf).await?;
        stream.flush().await?;

        Self::authenticate(&mut stream, &user, password.as_deref()).await?;
        Self::await_ready(&mut stream).await?;

        tracing::debug!(%host, port, %user, %database, "Replication connection established");
        Ok(Self { stream })
    }

    /// Drive the authentication exchange until the server accepts us.
    async fn authenticate(
        stream: &mut BufReader<TcpStream>,
        user: &str,
        password: Option<&str>,
    ) -> Result<()> {
        loop {
            let (type_code, body) = read_backend_message(stream).await?;

            let mut raw = BytesMut::with_capacity(1 + 4 + body.len());
            raw.put_u8(type_code);
            raw.put_i32((body.len() + 4) as i32);
            raw.put_slice(&body);
            let message = backend::Message::parse(&mut raw)?
                .ok_or_else(|| CdcError::Protocol("truncated authentication message".into()))?;

            match message {
                backend::Message::AuthenticationOk => return Ok(()),
                backend::Message::AuthenticationCleartextPassword => {
                    let pass = password
                        .ok_or_else(|| CdcError::Auth("password required but not provided".into()))?;
                    let mut buf = BytesMut::new();
                    frontend::password_message(pass.as_bytes(), &mut buf)?;
                    stream.write_all(&buf).await?;
                    stream.flush().await?;
                }
                backend::Message::AuthenticationMd5Password(body) => {
                    let pass = password
                        .ok_or_else(|| CdcError::Auth("password required but not provided".into()))?;
                    let hashed = md5_password_hash(user, pass, &body.salt());
                    let mut buf = BytesMut::new();
                    frontend::password_message(hashed.as_bytes(), &mut buf)?;
                    stream.write_all(&buf).await?;
                    stream.flush().await?;
                }
                backend::Message::AuthenticationSasl(_) => {
                    return Err(CdcError::Auth(
                        "server requires SCRAM, which this client does not speak".into(),
                    ));
                }
                backend::Message::ErrorResponse(_) => {
                    return Err(CdcError::Auth("server rejected the connection".into()));
                }
                _ => {
                    return Err(CdcError::Protocol(format!(
                        "unexpected message {:?} during authentication",
                        type_code as char
                    )));
                }
            }
        }
    }

    /// Consume post-auth parameter chatter until ReadyForQuery.
    async fn await_ready(stream: &mut BufReader<TcpStream>) -> Result<()> {
        loop {
            let (type_code, _body) = read_backend_message(stream).await?;
            match type_code {
                b'Z' => return Ok(()),
                b'E' => {
                    return Err(CdcError::Connection(
                        "server error before ReadyForQuery".into(),
                    ));
                }
                // ParameterStatus, BackendKeyData, notices.
                _ => {}
            }
        }
    }

    /// Issue `START_REPLICATION` against `slot` and enter CopyBoth mode.
    ///
    /// Streaming starts at `0/0`, which for a logical slot means the slot's
    /// confirmed position; the server, not this client, owns the resume
    /// point.
    pub async fn start_replication(mut self, slot_name: &str) -> Result<ReplicationStream> {
        let command =
            format!("START_REPLICATION SLOT {slot_name} LOGICAL 0/0 (\"format-version\" '1')");

        let mut buf = BytesMut::new();
        frontend::query(&command, &mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;

        let (type_code, _body) = read_backend_message(&mut self.stream).await?;
        match type_code {
            // CopyBothResponse
            b'W' => {
                tracing::debug!(slot = %slot_name, "Entered CopyBoth mode");
                Ok(ReplicationStream {
                    stream: self.stream,
                })
            }
            b'E' => Err(CdcError::Protocol(format!(
                "server refused START_REPLICATION on slot {slot_name}"
            ))),
            other => Err(CdcError::Protocol(format!(
                "unexpected response {:?} to START_REPLICATION",
                other as char
            ))),
        }
    }
}

/// The CopyBoth stream carrying WAL data and standby feedback.
pub struct ReplicationStream {
    stream: BufReader<TcpStream>,
}

impl ReplicationStream {
    /// Wait up to the poll interval for the next frame.
    ///
    /// The poll timeout applies only to the leading type byte, so an elapsed
    /// timeout never splits a frame.
    pub async fn next_frame(&mut self) -> Result<WalFrame> {
        let type_code = match timeout(POLL_TIMEOUT, self.stream.read_u8()).await {
            Ok(Ok(code)) => code,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(WalFrame::Closed);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => return Ok(WalFrame::Idle),
        };

        let len = self.stream.read_i32().await? as usize;
        if len < 4 {
            return Err(CdcError::Protocol(format!("invalid frame length {len}")));
        }
        let mut body = vec![0u8; len - 4];
        self.stream.read_exact(&mut body).await?;

        match type_code {
            // CopyData
            b'd' => parse_copy_data(Bytes::from(body)),
            // CopyDone
            b'c' => Ok(WalFrame::Closed),
            b'E' => Err(CdcError::Protocol("server error during replication".into())),
            other => Err(CdcError::Protocol(format!(
                "unexpected message type {:?} in copy stream",
                other as char
            ))),
        }
    }

    /// Report `flush_lsn` as written, flushed, and applied.
    pub async fn send_status_update(&mut self, flush_lsn: u64) -> Result<()> {
        let mut payload = BytesMut::with_capacity(34);
        payload.put_u8(b'r');
        payload.put_u64(flush_lsn);
        payload.put_u64(flush_lsn);
        payload.put_u64(flush_lsn);
        payload.put_i64(pg_clock_micros());
        payload.put_u8(0);

        let mut frame = BytesMut::with_capacity(1 + 4 + payload.len());
        frame.put_u8(b'd');
        frame.put_i32((payload.len() + 4) as i32);
        frame.put_slice(&payload);

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Split one CopyData payload into a WAL frame.
fn parse_copy_data(mut body: Bytes) -> Result<WalFrame> {
    if !body.has_remaining() {
        return Err(CdcError::Protocol("empty CopyData payload".into()));
    }
    match body.get_u8() {
        b'w' => {
            if body.remaining() < 24 {
                return Err(CdcError::Protocol("truncated XLogData header".into()));
            }
            let start_lsn = body.get_u64();
            let _wal_end = body.get_u64();
            let _server_clock = body.get_i64();
            Ok(WalFrame::XLogData {
                start_lsn,
                payload: body,
            })
        }
        b'k' => {
            if body.remaining() < 17 {
                return Err(CdcError::Protocol("truncated keepalive".into()));
            }
            let wal_end = body.get_u64();
            let _server_clock = body.get_i64();
            let reply_requested = body.get_u8() == 1;
            Ok(WalFrame::Keepalive {
                wal_end,
                reply_requested,
            })
        }
        other => Err(CdcError::Protocol(format!(
            "unknown replication message {:?}",
            other as char
        ))),
    }
}

/// Read one backend message as (type byte, body without the length header).
async fn read_backend_message(stream: &mut BufReader<TcpStream>) -> Result<(u8, Vec<u8>)> {
    let type_code = stream.read_u8().await?;
    let len = stream.read_i32().await? as usize;
    if len < 4 {
        return Err(CdcError::Protocol(format!("invalid message length {len}")));
    }
    let mut body = vec![0u8; len - 4];
    stream.read_exact(&mut body).await?;
    Ok((type_code, body))
}

/// Microseconds since the PostgreSQL epoch, for status-update clocks.
fn pg_clock_micros() -> i64 {
    let pg_epoch =
        std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(PG_EPOCH_UNIX_SECS);
    std::time::SystemTime::now()
        .duration_since(pg_epoch)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// `md5` + md5(md5(password ∥ user) ∥ salt), hex-encoded, per the protocol.
fn md5_password_hash(user: &str, password: &str, salt: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password);
    hasher.update(user);
    let inner = hex::encode(hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(inner);
    hasher.update(salt);
    format!("md5{}", hex::encode(hasher.finalize()))
}
