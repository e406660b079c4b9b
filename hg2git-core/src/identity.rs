use std::sync::OnceLock;

use anyhow::Result;
use git2::{Signature, Time};
use regex::Regex;

static AUTHOR_RE: OnceLock<Regex> = OnceLock::new();

/// Author identity split into the name/email pair a git commit carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// A commit timestamp: seconds since the epoch plus the author's UTC offset
/// in minutes east, the form git stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhenSpec {
    pub seconds: i64,
    pub offset_minutes: i32,
}

impl Identity {
    /// Split an author string of the form `name <email>`. Anything else is
    /// used whole as the name, with an empty email.
    pub fn parse(author: &str) -> Self {
        let re = AUTHOR_RE
            .get_or_init(|| Regex::new(r"^(.*?)\s+<(.*)>").expect("author pattern is valid"));

        match re.captures(author) {
            Some(caps) => Identity {
                name: caps[1].to_string(),
                email: caps[2].to_string(),
            },
            None => Identity {
                name: author.to_string(),
                email: String::new(),
            },
        }
    }

    /// Build a git signature acting as this identity at the given time.
    pub fn signature(&self, when: WhenSpec) -> Result<Signature<'static>> {
        Ok(Signature::new(
            &self.name,
            &self.email,
            &Time::new(when.seconds, when.offset_minutes),
        )?)
    }
}
