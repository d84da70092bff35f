//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are 20-byte SHA-1 digests. They uniquely identify all objects
//! in Git (blobs, trees, commits, tags).
//!
//! ## Format
//!
//! - Binary: 20 raw bytes, as embedded in tree entries and pack trailers
//! - Text: 40 lowercase hex characters, as used in commits, pkt-lines and logs
//! - Short: first 7 hex characters for display
//!
//! `ObjectId::ZERO` (all zero bytes) is the sentinel for "absent", e.g. the
//! old value of a ref that is being created.

use crate::artifacts::objects::{OBJECT_ID_BYTES, OBJECT_ID_LENGTH};
use sha1::{Digest, Sha1};
use std::io;
use std::str::FromStr;

/// Git object identifier (SHA-1 hash)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_BYTES]);

impl ObjectId {
    /// The all-zero id, meaning "no object"
    pub const ZERO: ObjectId = ObjectId([0; OBJECT_ID_BYTES]);

    pub fn from_bytes(bytes: [u8; OBJECT_ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse and validate an object ID from its hex form
    ///
    /// # Arguments
    ///
    /// * `id` - 40-character hexadecimal string (either case)
    ///
    /// # Returns
    ///
    /// Validated ObjectId or error if invalid length/characters
    pub fn try_parse(id: &str) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }

        let mut bytes = [0; OBJECT_ID_BYTES];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&id[i * 2..i * 2 + 2], 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid hex digit"))?;
        }

        Ok(Self(bytes))
    }

    /// Hash a loose object (`<type> <size>\0<payload>`) the way Git does
    pub fn hash_object(object_type: &str, payload: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{object_type} {}\0", payload.len()).as_bytes());
        hasher.update(payload);

        Self(hasher.finalize().into())
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_BYTES] {
        &self.0
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree entries.
    pub fn write_binary_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.0)?;

        Ok(())
    }

    /// Read an object ID from binary format (20 bytes)
    ///
    /// Used when deserializing tree entries.
    pub fn read_binary_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut bytes = [0; OBJECT_ID_BYTES];
        reader.read_exact(&mut bytes)?;

        Ok(Self(bytes))
    }

    /// First 7 characters of the hex form (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        self.to_string()[..7].to_string()
    }
}

impl FromStr for ObjectId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({self})")
    }
}
