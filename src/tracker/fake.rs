//! In-memory tracker for exercising the resolver and workflow without a server.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{
    Comment, NetworkError, Result, Tracker, comment_create_payload, comment_update_payload,
    issue_update_payload,
};

/// A call the fake received, with the payload a real client would have sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Fetch(String),
    FetchComments(String),
    Write {
        method: &'static str,
        endpoint: String,
        payload: Value,
    },
}

#[derive(Default)]
pub struct FakeTracker {
    /// Text served per endpoint, for both issues and comments.
    pub texts: HashMap<String, String>,
    pub comments: Vec<Comment>,
    /// When set, every write fails with this status and body.
    pub write_failure: Option<(u16, &'static str)>,
    /// When set, every read fails with this status and body.
    pub read_failure: Option<(u16, &'static str)>,
    pub calls: RefCell<Vec<Call>>,
}

impl FakeTracker {
    pub fn with_text(endpoint: &str, text: &str) -> Self {
        Self {
            texts: HashMap::from([(endpoint.to_string(), text.to_string())]),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Write { .. }))
            .collect()
    }

    fn read(&self, endpoint: &str) -> Result<String> {
        self.calls
            .borrow_mut()
            .push(Call::Fetch(endpoint.to_string()));
        if let Some((status, body)) = self.read_failure {
            return Err(NetworkError::Application {
                status,
                body: body.to_string(),
            });
        }
        self.texts
            .get(endpoint)
            .cloned()
            .ok_or_else(|| NetworkError::Application {
                status: 404,
                body: format!("no fixture for {endpoint}"),
            })
    }

    fn write(&self, method: &'static str, endpoint: &str, payload: Value) -> Result<()> {
        self.calls.borrow_mut().push(Call::Write {
            method,
            endpoint: endpoint.to_string(),
            payload,
        });
        match self.write_failure {
            Some((status, body)) => Err(NetworkError::Application {
                status,
                body: body.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Tracker for FakeTracker {
    fn fetch_issue_text(&self, endpoint: &str) -> Result<String> {
        self.read(endpoint)
    }

    fn fetch_comment_text(&self, endpoint: &str) -> Result<String> {
        self.read(endpoint)
    }

    fn fetch_comments(&self, endpoint: &str) -> Result<Vec<Comment>> {
        self.calls
            .borrow_mut()
            .push(Call::FetchComments(endpoint.to_string()));
        Ok(self.comments.clone())
    }

    fn update_issue_text(&self, endpoint: &str, text: &str) -> Result<()> {
        self.write("PUT", endpoint, issue_update_payload(text))
    }

    fn update_comment_text(&self, endpoint: &str, text: &str) -> Result<()> {
        self.write("PUT", endpoint, comment_update_payload(text))
    }

    fn create_comment(
        &self,
        endpoint: &str,
        text: &str,
        extra_fields: &Map<String, Value>,
    ) -> Result<()> {
        self.write("POST", endpoint, comment_create_payload(text, extra_fields))
    }
}
