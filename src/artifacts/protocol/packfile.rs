//! Packfile encoding and decoding
//!
//! ## Format
//!
//! ```text
//! "PACK" | version: u32 BE (2) | object count: u32 BE
//! per object: type/size header | zlib-deflated payload
//! SHA-1 of everything above
//! ```
//!
//! The type/size header stores the object type in bits 4-6 of the first
//! byte and the payload size as a little-endian base-128 varint, 4 bits in
//! the first byte and 7 in each following byte. Only whole (undeltified)
//! objects are produced or accepted.
//!
//! ## Staging
//!
//! [`PackfileWriter`] encodes each object as soon as it is added, either
//! into memory or into an anonymous temporary file, so a large session
//! never holds two copies of its payloads.

use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::object::PackfileObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::protocol::pkt_line;
use anyhow::Context;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use tokio::io::AsyncWrite;
use tracing::debug;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;

/// Objects staged in memory before [`StorageMode::Auto`] spills to disk
pub const AUTO_SPILL_THRESHOLD: usize = 10;

const HEADER_LEN: usize = 12;
const COPY_CHUNK: usize = 64 * 1024;

/// Where staged pack entries are kept until they are pushed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StorageMode {
    Memory,
    /// Anonymous temporary file, removed on cleanup
    Disk,
    /// Memory until more than [`AUTO_SPILL_THRESHOLD`] objects are staged
    #[default]
    Auto,
}

/// One command of a `receive-pack` request
///
/// A zero `old` creates the ref, a zero `new` deletes it.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RefUpdate {
    pub name: String,
    pub old: ObjectId,
    pub new: ObjectId,
}

impl RefUpdate {
    pub fn is_delete(&self) -> bool {
        self.new.is_zero()
    }

    fn command_line(&self, first: bool) -> String {
        let capabilities = if first { "\0report-status" } else { "" };
        format!("{} {} {}{capabilities}\n", self.old, self.new, self.name)
    }
}

#[derive(Debug)]
enum Storage {
    Memory(Vec<u8>),
    Disk(File),
}

/// Accumulates objects into a packfile and writes `receive-pack` requests
#[derive(Debug)]
pub struct PackfileWriter {
    mode: StorageMode,
    storage: Storage,
    staged: HashSet<ObjectId>,
}

impl PackfileWriter {
    pub fn new(mode: StorageMode) -> anyhow::Result<Self> {
        let storage = match mode {
            StorageMode::Disk => Storage::Disk(
                tempfile::tempfile().context("Unable to create packfile staging file")?,
            ),
            StorageMode::Memory | StorageMode::Auto => Storage::Memory(Vec::new()),
        };

        Ok(PackfileWriter {
            mode,
            storage,
            staged: HashSet::new(),
        })
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self.storage, Storage::Disk(_))
    }

    pub fn has_objects(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.staged.len()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.staged.contains(id)
    }

    /// Stage an object; returns `false` if it was already staged
    pub fn add_object(&mut self, object: &PackfileObject) -> anyhow::Result<bool> {
        if self.staged.contains(&object.hash) {
            return Ok(false);
        }

        let entry = encode_entry(object.object_type, &object.data)
            .with_context(|| format!("encode pack entry {}", object.hash))?;

        match &mut self.storage {
            Storage::Memory(buffer) => buffer.extend_from_slice(&entry),
            Storage::Disk(file) => {
                file.seek(SeekFrom::End(0))?;
                file.write_all(&entry)
                    .context("Unable to write packfile staging file")?;
            }
        }
        self.staged.insert(object.hash);

        if self.mode == StorageMode::Auto && self.staged.len() > AUTO_SPILL_THRESHOLD {
            self.spill_to_disk()?;
        }

        Ok(true)
    }

    /// Write a complete `receive-pack` request to `out`
    ///
    /// Command lines come first, then a flush packet, then the packfile.
    /// A request made only of deletes carries no packfile. The writer is
    /// shut down once everything has been written.
    pub async fn write_request<W>(&mut self, out: &mut W, updates: &[RefUpdate]) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        use tokio::io::AsyncWriteExt;

        for (index, update) in updates.iter().enumerate() {
            let line = pkt_line::encode(update.command_line(index == 0).as_bytes())?;
            out.write_all(&line).await?;
        }
        out.write_all(pkt_line::FLUSH_PKT).await?;

        if !updates.iter().all(RefUpdate::is_delete) {
            self.write_packfile(out).await?;
        }

        out.shutdown().await?;
        Ok(())
    }

    /// Write the staged objects as a packfile, trailer included
    pub async fn write_packfile<W>(&mut self, out: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut hasher = Sha1::new();

        let header = pack_header(self.staged.len())?;
        hasher.update(&header);
        out.write_all(&header).await?;

        match &mut self.storage {
            Storage::Memory(buffer) => {
                hasher.update(buffer.as_slice());
                out.write_all(buffer).await?;
            }
            Storage::Disk(file) => {
                file.seek(SeekFrom::Start(0))?;
                let mut reader = tokio::fs::File::from_std(file.try_clone()?);
                let mut chunk = vec![0; COPY_CHUNK];

                loop {
                    let read = reader.read(&mut chunk).await?;
                    if read == 0 {
                        break;
                    }
                    hasher.update(&chunk[..read]);
                    out.write_all(&chunk[..read]).await?;
                }
            }
        }

        out.write_all(&hasher.finalize()).await?;
        debug!(objects = self.staged.len(), "packfile written");

        Ok(())
    }

    /// Drop every staged object, keeping the storage mode
    pub fn reset(&mut self) -> anyhow::Result<()> {
        *self = PackfileWriter::new(self.mode)?;
        Ok(())
    }

    /// Release staged objects and any temporary file
    pub fn cleanup(&mut self) {
        self.storage = Storage::Memory(Vec::new());
        self.staged.clear();
    }

    fn spill_to_disk(&mut self) -> anyhow::Result<()> {
        if let Storage::Memory(buffer) = &self.storage {
            let mut file = tempfile::tempfile().context("Unable to create packfile staging file")?;
            file.write_all(buffer)
                .context("Unable to write packfile staging file")?;

            debug!(objects = self.staged.len(), "packfile staging spilled to disk");
            self.storage = Storage::Disk(file);
        }

        Ok(())
    }
}

fn pack_header(count: usize) -> anyhow::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(PACK_SIGNATURE);
    header.write_u32::<BigEndian>(PACK_VERSION)?;
    header.write_u32::<BigEndian>(
        u32::try_from(count).context("too many objects for one packfile")?,
    )?;

    Ok(header)
}

/// Encode one undeltified pack entry
pub fn encode_entry(object_type: ObjectType, data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut entry = Vec::new();

    let mut size = data.len();
    let mut byte = (object_type.pack_code() << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        entry.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    entry.push(byte);

    let mut encoder = flate2::write::ZlibEncoder::new(entry, flate2::Compression::default());
    encoder
        .write_all(data)
        .context("Unable to compress object content")?;

    encoder
        .finish()
        .context("Unable to finish compressing object content")
}

/// Encode a set of objects as a complete packfile
pub fn encode_packfile<'a>(
    objects: impl IntoIterator<Item = &'a PackfileObject>,
) -> anyhow::Result<Bytes> {
    let mut entries = Vec::new();
    let mut count = 0;
    for object in objects {
        entries.extend(encode_entry(object.object_type, &object.data)?);
        count += 1;
    }

    let mut pack = pack_header(count)?;
    pack.extend(entries);
    let trailer = Sha1::digest(&pack);
    pack.extend_from_slice(&trailer);

    Ok(pack.into())
}

/// Decode a packfile of undeltified objects
pub fn parse_packfile(pack: &[u8]) -> anyhow::Result<Vec<PackfileObject>> {
    if pack.len() < HEADER_LEN + OBJECT_ID_BYTES {
        anyhow::bail!("packfile too short ({} bytes)", pack.len());
    }

    let (body, trailer) = pack.split_at(pack.len() - OBJECT_ID_BYTES);
    if Sha1::digest(body).as_slice() != trailer {
        anyhow::bail!("packfile checksum mismatch");
    }

    let mut reader = Cursor::new(body);
    let mut signature = [0; 4];
    reader.read_exact(&mut signature)?;
    if &signature != PACK_SIGNATURE {
        anyhow::bail!("invalid packfile signature");
    }
    let version = reader.read_u32::<BigEndian>()?;
    if version != 2 && version != 3 {
        anyhow::bail!("unsupported packfile version {version}");
    }
    let count = reader.read_u32::<BigEndian>()?;

    // every entry takes at least one byte
    let mut objects = Vec::with_capacity((count as usize).min(body.len() - HEADER_LEN));
    for index in 0..count {
        let (object_type, size) = read_entry_header(&mut reader)
            .with_context(|| format!("read header of pack entry {index}"))?;

        let offset = reader.position() as usize;
        let remaining = &body[offset..];
        let mut decoder = flate2::bufread::ZlibDecoder::new(remaining);
        let mut data = Vec::with_capacity(size.min(remaining.len()));
        (&mut decoder)
            .take((size as u64).saturating_add(1))
            .read_to_end(&mut data)
            .with_context(|| format!("decompress pack entry {index}"))?;
        if data.len() != size {
            anyhow::bail!(
                "pack entry {index}: expected {size} bytes, inflated {}",
                data.len()
            );
        }
        reader.set_position((offset as u64) + decoder.total_in());

        objects.push(PackfileObject::from_raw(object_type, data.into())?);
    }

    Ok(objects)
}

fn read_entry_header(reader: &mut Cursor<&[u8]>) -> anyhow::Result<(ObjectType, usize)> {
    let mut byte = ReadBytesExt::read_u8(reader)?;
    let object_type = ObjectType::from_pack_code((byte >> 4) & 0x07)?;

    let mut size = (byte & 0x0f) as usize;
    let mut shift = 4;
    while byte & 0x80 != 0 {
        byte = ReadBytesExt::read_u8(reader)?;
        if shift >= usize::BITS {
            anyhow::bail!("entry size varint too long");
        }
        size |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
    }

    Ok((object_type, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::MODE_REGULAR;
    use crate::artifacts::objects::tree::PackfileTreeEntry;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample_objects() -> Vec<PackfileObject> {
        let small = PackfileObject::blob("hello\n");
        let large = PackfileObject::blob(vec![b'z'; 5000]);
        let tree = PackfileObject::tree(&[
            PackfileTreeEntry::new(MODE_REGULAR, "hello.txt", small.hash),
            PackfileTreeEntry::new(MODE_REGULAR, "large.bin", large.hash),
        ])
        .unwrap();

        vec![small, large, tree]
    }

    // ========== Entry Header Tests ==========

    #[rstest]
    #[case(0, vec![0x30])]
    #[case(15, vec![0x3f])]
    #[case(16, vec![0xb0, 0x01])]
    #[case(5000, vec![0xb8, 0xb8, 0x02])]
    fn entry_header_encodes_size_varint(#[case] size: usize, #[case] expected: Vec<u8>) {
        let entry = encode_entry(ObjectType::Blob, &vec![b'a'; size]).unwrap();

        assert_eq!(&entry[..expected.len()], expected.as_slice());

        let (object_type, decoded) = read_entry_header(&mut Cursor::new(&entry[..])).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(decoded, size);
    }

    // ========== Packfile Tests ==========

    #[test]
    fn parses_what_it_encodes() {
        let objects = sample_objects();

        let pack = encode_packfile(&objects).unwrap();
        let parsed = parse_packfile(&pack).unwrap();

        assert_eq!(parsed, objects);
    }

    #[test]
    fn rejects_corrupted_trailer() {
        let mut pack = encode_packfile(&sample_objects()).unwrap().to_vec();
        let last = pack.len() - 1;
        pack[last] ^= 0xff;

        assert!(parse_packfile(&pack).is_err());
    }

    #[test]
    fn rejects_overlong_size_varint() {
        let mut body = pack_header(1).unwrap();
        body.push(0xb0);
        body.extend_from_slice(&[0xff; 10]);
        let trailer = Sha1::digest(&body);
        body.extend_from_slice(&trailer);

        let err = parse_packfile(&body).unwrap_err();
        assert!(format!("{err:#}").contains("varint too long"));
    }

    #[test]
    fn huge_object_count_fails_without_allocating() {
        let mut body = pack_header(u32::MAX as usize).unwrap();
        body.push(0x30);
        let trailer = Sha1::digest(&body);
        body.extend_from_slice(&trailer);

        assert!(parse_packfile(&body).is_err());
    }

    #[test]
    fn rejects_entry_larger_than_declared() {
        let mut body = pack_header(1).unwrap();
        let entry = encode_entry(ObjectType::Blob, b"twelve bytes").unwrap();
        body.push(0x33); // blob, declared size 3
        body.extend_from_slice(&entry[1..]);
        let trailer = Sha1::digest(&body);
        body.extend_from_slice(&trailer);

        let err = parse_packfile(&body).unwrap_err();
        assert!(format!("{err:#}").contains("expected 3 bytes"));
    }

    #[test]
    fn rejects_deltified_entries() {
        let mut body = pack_header(1).unwrap();
        body.push(0x65); // type 6 (ofs-delta), size 5
        let trailer = Sha1::digest(&body);
        body.extend_from_slice(&trailer);

        let err = parse_packfile(&body).unwrap_err();
        assert!(format!("{err:#}").contains("not supported"));
    }

    // ========== Writer Tests ==========

    #[tokio::test]
    async fn writer_deduplicates_objects() {
        let mut writer = PackfileWriter::new(StorageMode::Memory).unwrap();
        let blob = PackfileObject::blob("same");

        assert!(writer.add_object(&blob).unwrap());
        assert!(!writer.add_object(&blob).unwrap());
        assert_eq!(writer.object_count(), 1);
    }

    #[tokio::test]
    async fn auto_mode_spills_past_threshold() {
        let mut writer = PackfileWriter::new(StorageMode::Auto).unwrap();

        for i in 0..AUTO_SPILL_THRESHOLD {
            writer.add_object(&PackfileObject::blob(format!("blob {i}"))).unwrap();
        }
        assert!(!writer.is_on_disk());

        writer.add_object(&PackfileObject::blob("one more")).unwrap();
        assert!(writer.is_on_disk());

        let mut out = Vec::new();
        writer.write_packfile(&mut out).await.unwrap();
        assert_eq!(parse_packfile(&out).unwrap().len(), AUTO_SPILL_THRESHOLD + 1);
    }

    #[rstest]
    #[case(StorageMode::Memory)]
    #[case(StorageMode::Disk)]
    #[tokio::test]
    async fn request_has_commands_flush_and_pack(#[case] mode: StorageMode) {
        let mut writer = PackfileWriter::new(mode).unwrap();
        for object in sample_objects() {
            writer.add_object(&object).unwrap();
        }
        let new = ObjectId::hash_object("commit", b"c");

        let mut out = Vec::new();
        writer
            .write_request(&mut out, &[RefUpdate::new("refs/heads/main".into(), ObjectId::ZERO, new)])
            .await
            .unwrap();

        let (commands, offset) = pkt_line::decode_until_flush(&out).unwrap();
        assert_eq!(
            commands[0],
            Bytes::from(format!("{} {new} refs/heads/main\0report-status\n", ObjectId::ZERO))
        );
        assert_eq!(parse_packfile(&out[offset..]).unwrap(), sample_objects());
    }

    #[tokio::test]
    async fn delete_requests_carry_no_pack() {
        let mut writer = PackfileWriter::new(StorageMode::Memory).unwrap();
        let old = ObjectId::hash_object("commit", b"c");

        let mut out = Vec::new();
        writer
            .write_request(&mut out, &[RefUpdate::new("refs/heads/gone".into(), old, ObjectId::ZERO)])
            .await
            .unwrap();

        let (_, offset) = pkt_line::decode_until_flush(&out).unwrap();
        assert_eq!(offset, out.len());
    }

    #[test]
    fn cleanup_forgets_staged_objects() {
        let mut writer = PackfileWriter::new(StorageMode::Disk).unwrap();
        writer.add_object(&PackfileObject::blob("x")).unwrap();

        writer.cleanup();

        assert!(!writer.has_objects());
        assert!(!writer.is_on_disk());
    }
}
