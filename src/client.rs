//! Blocking client
//!
//! Opens one connection per request, matching the server's
//! one-frame-per-connection policy.

use std::net::TcpStream;
use std::time::Duration;

use crate::error::Result;
use crate::protocol::{read_response, write_request, Request, RequestOptions, Response};

/// Client for a QuillKV server
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Read/write timeout per request (`None` blocks indefinitely)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and wait for its response
    pub fn send(&self, request: &Request) -> Result<Response> {
        let mut stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;

        write_request(&mut stream, request)?;
        read_response(&mut stream)
    }

    /// GET from the default database
    pub fn get(&self, key: impl Into<Vec<u8>>) -> Result<Response> {
        self.send(&Request::get(key))
    }

    /// GET from a named database
    pub fn get_from(&self, db: &str, key: impl Into<Vec<u8>>) -> Result<Response> {
        self.send(&Request::get(key).in_db(db))
    }

    /// PUT into the default database
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<Response> {
        self.send(&Request::put(key, value))
    }

    /// PUT with an optional database and explicit options
    pub fn put_with(
        &self,
        db: Option<&str>,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut request = Request::put(key, value).with_options(options);
        if let Some(db) = db {
            request = request.in_db(db);
        }
        self.send(&request)
    }
}
