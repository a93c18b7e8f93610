//! Connection server
//!
//! One request per connection. Every accepted connection gets its own task
//! that decodes the request. Reads (`get`, `list`) are answered right there,
//! so a slow reader only holds its own task. Writes are forwarded to the
//! accept loop, which applies them one at a time in arrival order; `close`
//! ends the loop. After the loop ends no new connections are accepted, the
//! tasks already streaming results run to completion, and connections that
//! never sent a request are dropped.

use crate::protocol::{read_frame, write_frame, Answer, Query, Request};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use taxodb_core::config::ServerConfig;
use taxodb_core::types::lookup;
use taxodb_core::{TaxoError, TaxoResult};
use taxodb_storage::Database;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Writes are accepted from loopback peers only, unless configured otherwise
pub fn write_allowed(peer: &SocketAddr, allow_remote_writes: bool) -> bool {
    allow_remote_writes || peer.ip().is_loopback()
}

/// A write request waiting for the accept loop
struct WriteJob {
    request: Request,
    reply: oneshot::Sender<Answer>,
}

pub struct Server {
    db: Arc<Database>,
    listener: TcpListener,
    allow_remote_writes: bool,
}

impl Server {
    pub async fn bind(config: &ServerConfig, db: Arc<Database>) -> TaxoResult<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            db,
            listener,
            allow_remote_writes: config.allow_remote_writes,
        })
    }

    pub fn local_addr(&self) -> TaxoResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until a `close` request arrives
    pub async fn run(self) -> TaxoResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until a `close` request arrives or `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> TaxoResult<()>
    where
        F: Future<Output = ()>,
    {
        let (write_tx, mut write_rx) = mpsc::channel::<WriteJob>(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                Some(job) = write_rx.recv() => {
                    let close = job.request.query == Query::Close;
                    let answer = self.apply_write(job.request).await;
                    let _ = job.reply.send(answer);
                    if close {
                        info!("close requested");
                        break;
                    }
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!("connection task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            continue;
                        }
                    };
                    let connection = Connection {
                        db: Arc::clone(&self.db),
                        peer,
                        allow_remote_writes: self.allow_remote_writes,
                        writes: write_tx.clone(),
                        stop: stop_rx.clone(),
                    };
                    connections.spawn(connection.serve(stream));
                }
            }
        }

        // pending writes get an error answer once the receiver is gone
        drop(write_rx);
        let _ = stop_tx.send(true);
        drop(self.listener);
        let in_flight = connections.len();
        if in_flight > 0 {
            debug!(in_flight, "waiting for open connections");
        }
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                warn!("connection task failed: {}", e);
            }
        }
        info!("server stopped");
        Ok(())
    }

    /// Apply one write. The store work runs on the blocking pool; the loop
    /// waits for it, so writes never overlap.
    async fn apply_write(&self, request: Request) -> Answer {
        let db = Arc::clone(&self.db);
        let query = request.query;
        let result = tokio::task::spawn_blocking(move || execute_write(&db, &request)).await;
        match result {
            Ok(Ok(payload)) => Answer::success(payload),
            Ok(Err(e)) => {
                debug!(%query, "write rejected: {}", e);
                Answer::error(e)
            }
            Err(e) => Answer::error(format!("write task failed: {}", e)),
        }
    }
}

fn execute_write(db: &Database, request: &Request) -> TaxoResult<String> {
    match request.query {
        Query::Add => db.add(request.table()?, &request.pairs),
        Query::Set => db.set(request.table()?, &request.pairs).map(|_| String::new()),
        Query::Delete => db.delete(request.table()?, &request.pairs),
        Query::Commit => db.commit().map(|files| files.to_string()),
        Query::Close => Ok(String::new()),
        Query::Get | Query::List => Err(TaxoError::Protocol(format!(
            "{} is not a write",
            request.query
        ))),
    }
}

struct Connection {
    db: Arc<Database>,
    peer: SocketAddr,
    allow_remote_writes: bool,
    writes: mpsc::Sender<WriteJob>,
    stop: watch::Receiver<bool>,
}

impl Connection {
    #[instrument(skip_all, fields(peer = %self.peer))]
    async fn serve<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);

        let decoded = tokio::select! {
            decoded = read_frame::<_, Request>(&mut reader) => decoded,
            _ = self.stop.changed() => {
                debug!("dropping idle connection");
                return;
            }
        };
        let request = match decoded {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("connection closed before a request");
                return;
            }
            Err(e) => {
                warn!("bad request: {}", e);
                let _ = finish(&mut writer, &Answer::error(e), &[]).await;
                return;
            }
        };
        debug!(query = %request.query, table = ?request.table, "request");

        let result = if request.query.is_write() {
            self.write(request).await
        } else {
            self.read(&request)
        };
        let (answer, records) = match result {
            Ok(answer) => answer,
            Err(e) => (Answer::error(e), Vec::new()),
        };
        if let Err(e) = finish(&mut writer, &answer, &records).await {
            // a reader that hung up early is not an error of ours
            debug!("connection lost: {}", e);
        }
    }

    async fn write(&self, request: Request) -> TaxoResult<(Answer, Vec<String>)> {
        if !write_allowed(&self.peer, self.allow_remote_writes) {
            warn!(query = %request.query, "write from remote peer rejected");
            return Err(TaxoError::Forbidden);
        }
        let (reply, answer) = oneshot::channel();
        self.writes
            .send(WriteJob { request, reply })
            .await
            .map_err(|_| TaxoError::Other("server is closing".to_string()))?;
        let answer = answer
            .await
            .map_err(|_| TaxoError::Other("server is closing".to_string()))?;
        Ok((answer, Vec::new()))
    }

    /// Run a read under the database lock and serialize the result before
    /// any byte goes out
    fn read(&self, request: &Request) -> TaxoResult<(Answer, Vec<String>)> {
        let table = request.table()?;
        let records = match request.query {
            Query::Get => {
                let id = lookup(&request.pairs, "id")
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| TaxoError::Validation("missing field: id".to_string()))?;
                self.db.get(table, id)?.into_iter().collect()
            }
            _ => self.db.list(table, &request.pairs)?,
        };
        let lines = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((Answer::success(""), lines))
    }
}

async fn finish<W>(writer: &mut W, answer: &Answer, records: &[String]) -> TaxoResult<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    write_frame(writer, answer).await?;
    for record in records {
        writer.write_all(record.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use taxodb_core::{KeyValue, Table};
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;

    fn connection(
        db: &Arc<Database>,
        peer: &str,
        allow_remote_writes: bool,
    ) -> (Connection, mpsc::Receiver<WriteJob>, watch::Sender<bool>) {
        let (writes, queued) = mpsc::channel(4);
        let (stop_tx, stop) = watch::channel(false);
        let connection = Connection {
            db: Arc::clone(db),
            peer: peer.parse().unwrap(),
            allow_remote_writes,
            writes,
            stop,
        };
        (connection, queued, stop_tx)
    }

    /// Serve one request over an in-memory stream; returns the answer and
    /// the record lines that followed it
    async fn exchange(connection: Connection, request: &Request) -> (Answer, Vec<String>) {
        let (client, server_side) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(connection.serve(server_side));
        let (read, mut write) = tokio::io::split(client);
        write_frame(&mut write, request).await.unwrap();

        let mut reader = BufReader::new(read);
        let answer: Answer = read_frame(&mut reader).await.unwrap().unwrap();
        let mut records = Vec::new();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.unwrap() {
            records.push(line);
        }
        task.await.unwrap();
        (answer, records)
    }

    #[tokio::test]
    async fn test_remote_write_is_forbidden() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let (connection, mut queued, _stop) = connection(&db, "192.0.2.7:5000", false);

        let add = Request::new(
            Query::Add,
            Table::Taxonomy,
            vec![KeyValue::new("name", "Animalia")],
        );
        let (answer, records) = exchange(connection, &add).await;
        assert_eq!(answer, Answer::error("forbidden"));
        assert!(records.is_empty());
        // nothing reached the write queue or the store
        assert!(queued.try_recv().is_err());
        assert!(db.list(Table::Taxonomy, &[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_read_is_answered() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        db.add(
            Table::Taxonomy,
            &[KeyValue::new("name", "Animalia"), KeyValue::new("rank", "kingdom")],
        )
        .unwrap();
        let (connection, _queued, _stop) = connection(&db, "192.0.2.7:5000", false);

        let get = Request::new(Query::Get, Table::Taxonomy, vec![KeyValue::new("id", "1")]);
        let (answer, records) = exchange(connection, &get).await;
        assert_eq!(answer, Answer::success(""));
        assert_eq!(records, vec![r#"{"id":"1","name":"Animalia","rank":"kingdom"}"#]);
    }

    #[tokio::test]
    async fn test_remote_write_queued_when_allowed() {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(dir.path()).unwrap());
        let (connection, mut queued, _stop) = connection(&db, "192.0.2.7:5000", true);
        let accept_loop = tokio::spawn(async move {
            let job = queued.recv().await.unwrap();
            job.reply.send(Answer::success("0")).unwrap();
            job.request.query
        });

        let (answer, _) = exchange(connection, &Request::bare(Query::Commit)).await;
        assert_eq!(answer, Answer::success("0"));
        assert_eq!(accept_loop.await.unwrap(), Query::Commit);
    }

    #[test]
    fn test_write_allowed() {
        let local: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let local_v6: SocketAddr = "[::1]:5000".parse().unwrap();
        let remote: SocketAddr = "192.0.2.7:5000".parse().unwrap();

        assert!(write_allowed(&local, false));
        assert!(write_allowed(&local_v6, false));
        assert!(!write_allowed(&remote, false));
        assert!(write_allowed(&remote, true));
    }
}
