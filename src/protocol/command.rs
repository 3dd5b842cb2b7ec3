//! Request definitions
//!
//! Represents requests from clients.

/// Command carried in the low bit of the control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Read a value by key
    Get = 0,

    /// Write a key-value pair
    Put = 1,
}

impl Command {
    /// Whether the command mutates the store
    pub fn is_write(self) -> bool {
        matches!(self, Command::Put)
    }
}

/// Request options that are not implied by the shape of the request.
///
/// DBNAME and DATA are carried by `Request::dbname` and `Request::value`
/// being present, so they cannot disagree with the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Propagate the mutation to replicas
    pub replication: bool,

    /// Acknowledge only once the write is durable
    pub sync: bool,

    /// The value is compressed by the client
    pub compress: bool,
}

impl RequestOptions {
    pub fn replication(mut self, enabled: bool) -> Self {
        self.replication = enabled;
        self
    }

    pub fn sync(mut self, enabled: bool) -> Self {
        self.sync = enabled;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }
}

/// A parsed request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub options: RequestOptions,

    /// Target database; `None` addresses the default database
    pub dbname: Option<String>,

    pub key: Vec<u8>,

    /// Present for PUT, optional for GET (ignored by the server)
    pub value: Option<Vec<u8>>,
}

impl Request {
    /// Create a GET request against the default database
    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Self {
            command: Command::Get,
            options: RequestOptions::default(),
            dbname: None,
            key: key.into(),
            value: None,
        }
    }

    /// Create a PUT request against the default database
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            command: Command::Put,
            options: RequestOptions::default(),
            dbname: None,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Address a named database
    pub fn in_db(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// DBNAME option
    pub fn has_dbname(&self) -> bool {
        self.dbname.is_some()
    }

    /// DATA option
    pub fn has_data(&self) -> bool {
        self.value.is_some()
    }
}
