//! Write jobs exchanged between workers and the serializer

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::protocol::{Request, RequestOptions, ResponseCode};

/// A single-key mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Target database; `None` addresses the default database
    pub db: Option<String>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub compressed: bool,
}

impl Mutation {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            db: None,
            key: key.into(),
            value: value.into(),
            compressed: false,
        }
    }

    /// Build the mutation a PUT request asks for; `None` for requests
    /// without a value
    pub fn from_request(request: Request) -> Option<(Self, WriteOptions)> {
        let value = request.value?;
        let options = WriteOptions::from(request.options);
        Some((
            Self {
                db: request.dbname,
                key: request.key,
                value,
                compressed: request.options.compress,
            },
            options,
        ))
    }
}

/// How the serializer must apply a mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Acknowledge only after the write (and replication, if asked) is durable
    pub sync: bool,

    /// Hand the mutation to the replicator
    pub replicate: bool,
}

impl From<RequestOptions> for WriteOptions {
    fn from(options: RequestOptions) -> Self {
        Self {
            sync: options.sync,
            replicate: options.replication,
        }
    }
}

/// A mutation waiting in the write queue
///
/// Completed exactly once: `complete` consumes the job.
#[derive(Debug)]
pub struct WriteJob {
    pub mutation: Mutation,
    pub options: WriteOptions,
    reply: Sender<ResponseCode>,
}

impl WriteJob {
    /// Create a job and the receiver its result will be delivered on
    pub fn new(mutation: Mutation, options: WriteOptions) -> (Self, Receiver<ResponseCode>) {
        let (reply, result) = bounded(1);
        (
            Self {
                mutation,
                options,
                reply,
            },
            result,
        )
    }

    /// Deliver the result; returns false if the submitter stopped waiting
    pub fn complete(self, code: ResponseCode) -> bool {
        self.reply.send(code).is_ok()
    }
}
