//! Filesystem-backed source constructors: a line reader stream and a tar-member buffer.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::thread;

use dataloom_core::{Array, BoxBuffer, Buffer, Error, Result, Sample, Stream};

/// `stream_line_reader(path, out_key)` — yields one sample per line, `{out_key: raw_line_bytes}`.
/// Lines are read on demand; this stream is inherently single-pass (the source is a plain
/// `BufReader`, not a seekable/restartable handle), matching the "not freely restartable"
/// default for `Stream`.
pub struct LineReaderStream {
    lines: std::io::Lines<BufReader<File>>,
    out_key: String,
}

impl LineReaderStream {
    pub fn open(path: impl AsRef<Path>, out_key: impl Into<String>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            out_key: out_key.into(),
        })
    }
}

impl Stream for LineReaderStream {
    fn next(&mut self) -> Result<Option<Sample>> {
        match self.lines.next() {
            Some(Ok(line)) => {
                let sample = Sample::new().with(self.out_key.clone(), Array::byte_string(line.into_bytes()));
                Ok(Some(sample))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// `stream_line_reader(path, out_key) -> Stream`.
pub fn stream_line_reader(path: impl AsRef<Path>, out_key: impl Into<String>) -> Result<Box<dyn Stream>> {
    Ok(Box::new(LineReaderStream::open(path, out_key)?))
}

/// One listed tar member, possibly one level inside a nested archive.
struct TarMember {
    /// The member's own name (the file entry that actually holds its bytes).
    name: String,
    /// `Some(outer_member_name)` when `name` lives inside a `.tar` member of the top-level
    /// archive rather than directly in it.
    nested_in: Option<String>,
}

/// A buffer over tar archive members: `get(i)` yields `{file: bytes(member_name), archive:
/// bytes(top_level_path)}`, plus `nested_archive: bytes(outer_member_name)` when the member
/// was found one level inside a nested `.tar` member. Member bytes themselves are not read
/// here — the TAR member reader that turns a member name (and, for nested members, the
/// archive it's nested in) into its content bytes is an opaque collaborator consumed
/// downstream via `key_transform`, not something this core prescribes.
struct TarMemberBuffer {
    archive_path: PathBuf,
    members: Vec<TarMember>,
}

impl Buffer for TarMemberBuffer {
    fn len(&self) -> usize {
        self.members.len()
    }

    fn get(&self, index: i64) -> Result<Sample> {
        let i = self.resolve_index(index)?;
        let member = &self.members[i];
        let mut sample = Sample::new()
            .with("file", Array::byte_string(member.name.clone().into_bytes()))
            .with(
                "archive",
                Array::byte_string(self.archive_path.to_string_lossy().into_owned().into_bytes()),
            );
        if let Some(outer_member) = &member.nested_in {
            sample = sample.with("nested_archive", Array::byte_string(outer_member.clone().into_bytes()));
        }
        Ok(sample)
    }
}

/// Lists the members of each nested-archive blob, spreading the work across `num_threads`
/// plain OS threads (chunked, one chunk per thread) the way [`crate::WorkerPool`]'s sibling
/// in `dataloom-prefetch` spreads sample processing.
fn list_nested_members(blobs: Vec<(String, Vec<u8>)>, num_threads: usize) -> Result<Vec<(String, Vec<String>)>> {
    if blobs.is_empty() {
        return Ok(Vec::new());
    }
    let num_threads = num_threads.max(1).min(blobs.len());
    let chunk_size = blobs.len().div_ceil(num_threads);

    let handles: Vec<_> = blobs
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| {
            let chunk = chunk.to_vec();
            thread::Builder::new()
                .name(format!("dataloom-nested-tar-{i}"))
                .spawn(move || -> Result<Vec<(String, Vec<String>)>> {
                    let mut out = Vec::with_capacity(chunk.len());
                    for (outer_member, bytes) in chunk {
                        let mut inner = tar::Archive::new(Cursor::new(bytes));
                        let mut names = Vec::new();
                        for entry in inner.entries()? {
                            let entry = entry?;
                            names.push(entry.path()?.to_string_lossy().into_owned());
                        }
                        out.push((outer_member, names));
                    }
                    Ok(out)
                })
                .expect("failed to spawn nested-tar listing thread")
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        let chunk_result = handle.join().map_err(|_| {
            Error::InvalidArgument("nested-tar listing thread panicked".to_string())
        })?;
        results.extend(chunk_result?);
    }
    Ok(results)
}

/// `files_from_tar(path, nested=false, num_threads=1) -> Buffer` — one sample per archive
/// member. With `nested`, any top-level member whose name ends in `.tar` is read fully into
/// memory and its own members are flattened into the result (one level only); the inner
/// listings are spread across `num_threads` threads. Without `nested`, a `.tar` member is
/// listed as an ordinary member and not descended into.
pub fn files_from_tar(path: impl AsRef<Path>, nested: bool, num_threads: usize) -> Result<BoxBuffer> {
    let path = path.as_ref().to_path_buf();
    let file = File::open(&path)?;
    let mut archive = tar::Archive::new(BufReader::new(file));

    let mut members = Vec::new();
    let mut nested_blobs: Vec<(String, Vec<u8>)> = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.to_string_lossy().into_owned();
        if nested && name.ends_with(".tar") {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            nested_blobs.push((name, bytes));
        } else {
            members.push(TarMember { name, nested_in: None });
        }
    }

    for (outer_member, inner_names) in list_nested_members(nested_blobs, num_threads)? {
        members.extend(inner_names.into_iter().map(|name| TarMember {
            name,
            nested_in: Some(outer_member.clone()),
        }));
    }

    Ok(Box::new(TarMemberBuffer {
        archive_path: path,
        members,
    }))
}
