//! Request and answer messages
//!
//! Messages are JSON objects, one per line. A request names the operation,
//! the table and the key/value pairs of the operation; the answer is a
//! single `"success: <payload>"` or `"error: <reason>"` message. Successful
//! `get` and `list` answers are followed by the records themselves, one per
//! line, until the server closes the connection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use taxodb_core::{KeyValue, Table, TaxoError, TaxoResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest accepted message line, newline included
pub const MAX_FRAME_LEN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Query {
    Add,
    Get,
    List,
    Set,
    Delete,
    Commit,
    Close,
}

impl Query {
    /// Operations that mutate the database or the server
    pub fn is_write(&self) -> bool {
        !matches!(self, Query::Get | Query::List)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Query::Add => "add",
            Query::Get => "get",
            Query::List => "list",
            Query::Set => "set",
            Query::Delete => "delete",
            Query::Commit => "commit",
            Query::Close => "close",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// commit and close carry an empty table name
fn table_or_empty<'de, D>(deserializer: D) -> Result<Option<Table>, D::Error>
where
    D: Deserializer<'de>,
{
    let name: Option<String> = Option::deserialize(deserializer)?;
    match name.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => name.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Query")]
    pub query: Query,
    #[serde(
        rename = "Table",
        default,
        deserialize_with = "table_or_empty",
        skip_serializing_if = "Option::is_none"
    )]
    pub table: Option<Table>,
    #[serde(rename = "KeyValues", default)]
    pub pairs: Vec<KeyValue>,
}

impl Request {
    pub fn new(query: Query, table: Table, pairs: Vec<KeyValue>) -> Self {
        Self {
            query,
            table: Some(table),
            pairs,
        }
    }

    /// A request that addresses no table (commit, close)
    pub fn bare(query: Query) -> Self {
        Self {
            query,
            table: None,
            pairs: Vec::new(),
        }
    }

    pub fn table(&self) -> TaxoResult<Table> {
        self.table
            .ok_or_else(|| TaxoError::Protocol(format!("{} request without table", self.query)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "Message")]
    pub message: String,
}

impl Answer {
    pub fn success(payload: impl fmt::Display) -> Self {
        Self {
            message: format!("success: {}", payload),
        }
    }

    pub fn error(reason: impl fmt::Display) -> Self {
        Self {
            message: format!("error: {}", reason),
        }
    }

    /// Split the message on its first `": "` into status and payload
    pub fn split(&self) -> (&str, &str) {
        match self.message.split_once(": ") {
            Some((status, payload)) => (status, payload),
            None => (self.message.trim_end_matches(':'), ""),
        }
    }

    pub fn is_success(&self) -> bool {
        self.split().0 == "success"
    }

    /// The payload of a success, or the reason of an error as a
    /// [`TaxoError`]
    pub fn into_result(self) -> TaxoResult<String> {
        let (status, payload) = self.split();
        match status {
            "success" => Ok(payload.to_string()),
            "error" if payload == "forbidden" => Err(TaxoError::Forbidden),
            "error" => Err(TaxoError::Other(payload.to_string())),
            _ => Err(TaxoError::Protocol(format!(
                "unexpected answer {:?}",
                self.message
            ))),
        }
    }
}

/// Read one JSON line. `None` at end of stream.
pub async fn read_frame<R, T>(reader: &mut R) -> TaxoResult<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    read_frame_limited(reader, MAX_FRAME_LEN).await
}

/// Like [`read_frame`], failing once a line grows past `limit` bytes
pub async fn read_frame_limited<R, T>(reader: &mut R, limit: u64) -> TaxoResult<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = (&mut *reader).take(limit).read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        if read as u64 >= limit && !line.ends_with('\n') {
            return Err(TaxoError::Protocol(format!(
                "message longer than {} bytes",
                limit
            )));
        }
        if !line.trim().is_empty() {
            return Ok(Some(serde_json::from_str(line.trim_end())?));
        }
    }
}

/// Write one value as a JSON line
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> TaxoResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::BufReader;

    #[test]
    fn test_request_wire_shape() {
        let request = Request::new(
            Query::Add,
            Table::Taxonomy,
            vec![KeyValue::new("name", "Canis")],
        );
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"Query":"add","Table":"taxonomy","KeyValues":[{"Key":"name","Value":"Canis"}]}"#
        );
    }

    #[test]
    fn test_request_without_table() {
        let request: Request = serde_json::from_str(r#"{"Query":"commit","Table":""}"#).unwrap();
        assert_eq!(request, Request::bare(Query::Commit));
        assert!(request.table().is_err());

        let request: Request = serde_json::from_str(r#"{"Query":"close"}"#).unwrap();
        assert_eq!(request.query, Query::Close);
    }

    #[test]
    fn test_unknown_table_or_query_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"Query":"get","Table":"genes"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"Query":"drop","Table":"taxonomy"}"#).is_err());
    }

    #[test]
    fn test_answer_split() {
        assert_eq!(Answer::success("12").split(), ("success", "12"));
        assert_eq!(Answer::success("").split(), ("success", ""));
        // only the first separator counts
        let answer = Answer::error("invalid value \"x\" for date: bad: input");
        assert_eq!(answer.split(), ("error", "invalid value \"x\" for date: bad: input"));
    }

    #[test]
    fn test_answer_into_result() {
        assert_eq!(Answer::success("7").into_result().unwrap(), "7");
        assert!(matches!(
            Answer::error("forbidden").into_result(),
            Err(TaxoError::Forbidden)
        ));
        assert!(matches!(
            Answer::error("taxon without name").into_result(),
            Err(TaxoError::Other(reason)) if reason == "taxon without name"
        ));
        let garbage = Answer {
            message: "maybe".to_string(),
        };
        assert!(matches!(garbage.into_result(), Err(TaxoError::Protocol(_))));
    }

    #[test]
    fn test_query_classes() {
        assert!(!Query::Get.is_write());
        assert!(!Query::List.is_write());
        for query in [Query::Add, Query::Set, Query::Delete, Query::Commit, Query::Close] {
            assert!(query.is_write(), "{}", query);
        }
    }

    #[tokio::test]
    async fn test_frames_skip_blank_lines() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Answer::success("1")).await.unwrap();
        buf.extend_from_slice(b"\n\n");
        write_frame(&mut buf, &Answer::error("forbidden")).await.unwrap();

        let mut reader = BufReader::new(buf.as_slice());
        let first: Answer = read_frame(&mut reader).await.unwrap().unwrap();
        let second: Answer = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, Answer::success("1"));
        assert_eq!(second, Answer::error("forbidden"));
        assert!(read_frame::<_, Answer>(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlong_frame_is_rejected() {
        let line = format!("{{\"Message\":\"success: {}\"}}\n", "x".repeat(64));
        let mut reader = BufReader::new(line.as_bytes());
        let result = read_frame_limited::<_, Answer>(&mut reader, 32).await;
        assert!(matches!(result, Err(TaxoError::Protocol(_))));

        let mut reader = BufReader::new(line.as_bytes());
        let answer: Answer = read_frame_limited(&mut reader, 1024).await.unwrap().unwrap();
        assert!(answer.is_success());
    }
}
