//! Async client for a taxodb server

use crate::protocol::{read_frame, write_frame, Answer, Query, Request};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use taxodb_core::{KeyValue, Table, TaxoError, TaxoResult};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// A client holds only the server address; every request opens its own
/// connection.
#[derive(Debug, Clone)]
pub struct Client {
    address: String,
}

impl Client {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a request and read the answer. On success the connection is
    /// returned positioned at the first record.
    async fn exchange(&self, request: &Request) -> TaxoResult<(String, BufReader<TcpStream>)> {
        let mut stream = TcpStream::connect(&self.address).await?;
        write_frame(&mut stream, request).await?;
        stream.flush().await?;
        debug!(query = %request.query, table = ?request.table, "sent to {}", self.address);

        let mut reader = BufReader::new(stream);
        let answer: Answer = read_frame(&mut reader)
            .await?
            .ok_or_else(|| TaxoError::Protocol("connection closed without answer".to_string()))?;
        Ok((answer.into_result()?, reader))
    }

    async fn call(&self, request: Request) -> TaxoResult<String> {
        self.exchange(&request).await.map(|(payload, _)| payload)
    }

    /// Add a record, returning its id
    pub async fn add(&self, table: Table, pairs: Vec<KeyValue>) -> TaxoResult<String> {
        self.call(Request::new(Query::Add, table, pairs)).await
    }

    /// Fetch one record by id or extern alias
    pub async fn get<T: DeserializeOwned>(&self, table: Table, id: &str) -> TaxoResult<Option<T>> {
        let request = Request::new(Query::Get, table, vec![KeyValue::new("id", id)]);
        let (_, mut reader) = self.exchange(&request).await?;
        read_frame(&mut reader).await
    }

    /// Start a listing; records are pulled from the returned scanner
    pub async fn list<T: DeserializeOwned>(
        &self,
        table: Table,
        pairs: Vec<KeyValue>,
    ) -> TaxoResult<Scanner<T>> {
        let (_, reader) = self.exchange(&Request::new(Query::List, table, pairs)).await?;
        Ok(Scanner::new(reader))
    }

    pub async fn set(&self, table: Table, pairs: Vec<KeyValue>) -> TaxoResult<()> {
        self.call(Request::new(Query::Set, table, pairs)).await.map(|_| ())
    }

    /// Delete records; the payload describes what went away
    pub async fn delete(&self, table: Table, pairs: Vec<KeyValue>) -> TaxoResult<String> {
        self.call(Request::new(Query::Delete, table, pairs)).await
    }

    /// Persist pending changes, returning the number of files written
    pub async fn commit(&self) -> TaxoResult<usize> {
        let payload = self.call(Request::bare(Query::Commit)).await?;
        payload
            .trim()
            .parse()
            .map_err(|_| TaxoError::Protocol(format!("unexpected commit answer {:?}", payload)))
    }

    /// Stop the server
    pub async fn close(&self) -> TaxoResult<()> {
        self.call(Request::bare(Query::Close)).await.map(|_| ())
    }
}

/// Pull cursor over the records of a `list` answer. Dropping it (or
/// calling [`Scanner::close`]) before the end closes the connection.
pub struct Scanner<T> {
    reader: Option<BufReader<TcpStream>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Scanner<T> {
    fn new(reader: BufReader<TcpStream>) -> Self {
        Self {
            reader: Some(reader),
            _record: PhantomData,
        }
    }

    /// Next record, `None` once the server has sent everything
    pub async fn next(&mut self) -> TaxoResult<Option<T>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let record = read_frame(reader).await;
        if !matches!(record, Ok(Some(_))) {
            self.reader = None;
        }
        record
    }

    pub fn close(&mut self) {
        self.reader = None;
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Drain the remaining records
    pub async fn collect(mut self) -> TaxoResult<Vec<T>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }
}
