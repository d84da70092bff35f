//! Git commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer information
//! - Commit message
//!
//! ## Format
//!
//! Payload of a commit object:
//! ```text
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//!
//! <commit message>
//! ```
//!
//! Only the first parent is surfaced on [`Commit`]; merge commits are read
//! without error but history walks follow the first parent.

use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

/// Author or committer information
///
/// Contains name, email, and timestamp with timezone information.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: DateTime<FixedOffset>,
}

/// Committers share the author representation.
pub type Committer = Author;

impl Author {
    /// Create a new author with the current timestamp
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Author {
            name: name.into(),
            email: email.into(),
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    /// Create a new author with a specific timestamp
    pub fn new_with_timestamp(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Author {
            name: name.into(),
            email: email.into(),
            timestamp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Format author name and email for display
    ///
    /// # Returns
    ///
    /// String in format "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Format complete author info as it is written into a commit
    ///
    /// # Returns
    ///
    /// String in format "Name <email> timestamp timezone"
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    /// Load author information from environment variables
    ///
    /// Reads GIT_AUTHOR_NAME, GIT_AUTHOR_EMAIL, and optionally GIT_AUTHOR_DATE.
    /// If no date is provided, uses current time.
    pub fn load_from_env() -> anyhow::Result<Self> {
        let name = std::env::var("GIT_AUTHOR_NAME").context("GIT_AUTHOR_NAME not set")?;
        let email = std::env::var("GIT_AUTHOR_EMAIL").context("GIT_AUTHOR_EMAIL not set")?;
        let timestamp = std::env::var("GIT_AUTHOR_DATE").ok().and_then(|date_str| {
            DateTime::parse_from_rfc2822(&date_str)
                .or_else(|_| DateTime::parse_from_str(&date_str, "%Y-%m-%d %H:%M:%S %z"))
                .ok()
        });

        Ok(match timestamp {
            Some(timestamp) => Self::new_with_timestamp(name, email, timestamp),
            None => Self::new(name, email),
        })
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        // "<name> <<email>> <timestamp> <timezone>", where the name may contain spaces
        let email_start = value
            .find('<')
            .ok_or_else(|| anyhow::anyhow!("Invalid author format: missing '<'"))?;
        let email_end = value
            .rfind('>')
            .ok_or_else(|| anyhow::anyhow!("Invalid author format: missing '>'"))?;
        if email_end < email_start {
            anyhow::bail!("Invalid author format: malformed email");
        }

        let name = value[..email_start].trim().to_string();
        let email = value[email_start + 1..email_end].to_string();

        let mut time_parts = value[email_end + 1..].split_whitespace();
        let timestamp = time_parts
            .next()
            .context("Invalid author format: missing timestamp")?
            .parse::<i64>()
            .context("Invalid author format: bad timestamp")?;
        let timezone = time_parts.next().unwrap_or("+0000");

        let offset = parse_timezone(timezone)?;
        let timestamp = DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| anyhow::anyhow!("Invalid timestamp"))?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp,
        })
    }
}

fn parse_timezone(timezone: &str) -> anyhow::Result<FixedOffset> {
    let (sign, digits) = match timezone.split_at_checked(1) {
        Some(("+", digits)) => (1, digits),
        Some(("-", digits)) => (-1, digits),
        _ => anyhow::bail!("Invalid timezone: {timezone}"),
    };
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("Invalid timezone: {timezone}");
    }

    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow::anyhow!("Invalid timezone: {timezone}"))
}

/// Decoded payload of a commit object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackfileCommit {
    pub tree: ObjectId,
    /// Parent commit IDs (empty for initial commit, several for merges)
    pub parents: Vec<ObjectId>,
    pub author: Author,
    pub committer: Committer,
    pub message: String,
}

impl PackfileCommit {
    pub fn serialize(&self) -> Bytes {
        let mut lines = vec![format!("tree {}", self.tree)];
        for parent in &self.parents {
            lines.push(format!("parent {parent}"));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));
        lines.push(String::new());
        lines.push(self.message.clone());

        Bytes::from(lines.join("\n"))
    }

    pub fn deserialize(payload: &[u8]) -> anyhow::Result<Self> {
        let content = std::str::from_utf8(payload).context("Invalid commit object: not UTF-8")?;
        let (headers, message) = match content.split_once("\n\n") {
            Some((headers, message)) => (headers, message),
            None => (content, ""),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            // continuation lines belong to multi-line headers such as gpgsig
            if line.starts_with(' ') {
                continue;
            }

            match line.split_once(' ') {
                Some(("tree", oid)) => tree = Some(ObjectId::try_parse(oid)?),
                Some(("parent", oid)) => parents.push(ObjectId::try_parse(oid)?),
                Some(("author", value)) => author = Some(Author::try_from(value)?),
                Some(("committer", value)) => committer = Some(Author::try_from(value)?),
                _ => {}
            }
        }

        Ok(PackfileCommit {
            tree: tree.context("Invalid commit object: missing tree line")?,
            parents,
            author: author.context("Invalid commit object: missing author line")?,
            committer: committer.context("Invalid commit object: missing committer line")?,
            message: message.to_string(),
        })
    }
}

/// A commit as seen by readers of the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: ObjectId,
    pub tree: ObjectId,
    /// First parent, or [`ObjectId::ZERO`] for a root commit
    pub parent: ObjectId,
    pub author: Author,
    pub committer: Committer,
    pub message: String,
}

impl Commit {
    pub fn from_packfile(hash: ObjectId, commit: &PackfileCommit) -> Self {
        Commit {
            hash,
            tree: commit.tree,
            parent: commit.parents.first().copied().unwrap_or(ObjectId::ZERO),
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            message: commit.message.clone(),
        }
    }

    /// Commit time, which is the committer's timestamp
    pub fn time(&self) -> DateTime<FixedOffset> {
        self.committer.timestamp()
    }

    pub fn has_parent(&self) -> bool {
        !self.parent.is_zero()
    }

    /// First line of the commit message
    pub fn short_message(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}
