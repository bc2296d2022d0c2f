//! Driver for the external revision-control helper.
//!
//! The helper is a small executable that knows how to list tags, enumerate
//! and fetch blobs, tokenize a blob and extract definitions and
//! documentation anchors from it. Its stdout is consumed as raw bytes and
//! split at the record level before anything is interpreted as text:
//! identifiers and paths in historical trees are not guaranteed to be UTF-8.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::process::Command;

use bstr::BString;

use crate::error::{InternalError, UserError};
use crate::family::Family;
use crate::records::parse_int;
use crate::{LineNumber, Result};

/// The environment variable the helper reads to locate the repository.
pub const REPO_DIR_ENV: &str = "TAGDEX_REPO_DIR";

#[derive(Debug, Clone)]
pub struct Repo {
    helper: PathBuf,
    repo_dir: PathBuf,
}

impl Repo {
    pub fn new(helper: impl Into<PathBuf>, repo_dir: impl Into<PathBuf>) -> Result<Repo> {
        let helper = helper.into();
        if !helper.is_file() {
            return Err(UserError::HelperNotFound(helper).into());
        }
        Ok(Repo { helper, repo_dir: repo_dir.into() })
    }

    /// All tag names of the repository, in the helper's order.
    pub fn list_tags(&self) -> Result<Vec<Vec<u8>>> {
        self.run_lines("list-tags", &[])
    }

    /// The (content hash, basename) pairs of one tag.
    pub fn list_blobs_with_filenames(&self, tag: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.list_blobs("-f", tag)
    }

    /// The (content hash, full path) pairs of one tag.
    pub fn list_blobs_with_paths(&self, tag: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.list_blobs("-p", tag)
    }

    fn list_blobs(&self, mode: &str, tag: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let lines = self.run_lines("list-blobs", &[mode.as_ref(), bytes_arg(tag)])?;
        lines
            .into_iter()
            .map(|line| match line.iter().position(|&b| b == b' ') {
                Some(space) => Ok((line[..space].to_vec(), line[space + 1..].to_vec())),
                None => Err(malformed("list-blobs", &line).into()),
            })
            .collect()
    }

    /// The raw content of one blob.
    pub fn get_blob(&self, hash: &[u8]) -> Result<Vec<u8>> {
        self.run("get-blob", &[bytes_arg(hash)])
    }

    /// Re-tokenizes a blob in boundary-marked mode: the returned chunks
    /// alternate between non-identifier and identifier text, starting with a
    /// non-identifier chunk. Non-identifier chunks carry `\x01` in place of
    /// each newline.
    pub fn tokenize(&self, hash: &[u8], family: Family) -> Result<Vec<Vec<u8>>> {
        self.run_lines("tokenize-file", &["-b".as_ref(), bytes_arg(hash), family.as_str().as_ref()])
    }

    /// The (identifier, kind character, line) definition triples of a blob.
    pub fn parse_defs(
        &self,
        hash: &[u8],
        filename: &[u8],
        family: Family,
    ) -> Result<Vec<(Vec<u8>, u8, LineNumber)>> {
        let args = [bytes_arg(hash), bytes_arg(filename), family.as_str().as_ref()];
        let lines = self.run_lines("parse-defs", &args)?;
        lines
            .into_iter()
            .map(|line| {
                let mut fields = line.split(|&b| b == b' ');
                let parsed = match (fields.next(), fields.next(), fields.next(), fields.next()) {
                    (Some(ident), Some([kind]), Some(num), None) => {
                        parse_int(num).map(|num| (ident.to_vec(), *kind, num))
                    }
                    _ => None,
                };
                parsed.ok_or_else(|| malformed("parse-defs", &line).into())
            })
            .collect()
    }

    /// The (identifier, line) documentation-comment anchors of a blob.
    pub fn parse_docs(&self, hash: &[u8], filename: &[u8]) -> Result<Vec<(Vec<u8>, LineNumber)>> {
        let lines = self.run_lines("parse-docs", &[bytes_arg(hash), bytes_arg(filename)])?;
        lines
            .into_iter()
            .map(|line| {
                let mut fields = line.split(|&b| b == b' ');
                let parsed = match (fields.next(), fields.next(), fields.next()) {
                    (Some(ident), Some(num), None) => {
                        parse_int(num).map(|num| (ident.to_vec(), num))
                    }
                    _ => None,
                };
                parsed.ok_or_else(|| malformed("parse-docs", &line).into())
            })
            .collect()
    }

    /// Whether the repository wants device-tree compatible-string indexing.
    pub fn dts_comp(&self) -> Result<bool> {
        let output = self.run("dts-comp", &[])?;
        let trimmed = output.strip_suffix(b"\n").unwrap_or(&output);
        match parse_int(trimmed) {
            Some(value) => Ok(value != 0),
            None => Err(malformed("dts-comp", &output).into()),
        }
    }

    fn run(&self, op: &'static str, args: &[&OsStr]) -> Result<Vec<u8>> {
        let output = Command::new(&self.helper)
            .arg(op)
            .args(args)
            .env(REPO_DIR_ENV, &self.repo_dir)
            .output()?;
        if !output.status.success() {
            return Err(InternalError::HelperFailed { helper_op: op, status: output.status }.into());
        }
        Ok(output.stdout)
    }

    /// Runs the helper and splits its output into newline-framed records,
    /// dropping the trailing empty record.
    fn run_lines(&self, op: &'static str, args: &[&OsStr]) -> Result<Vec<Vec<u8>>> {
        let output = self.run(op, args)?;
        let mut lines: Vec<Vec<u8>> =
            output.split(|&b| b == b'\n').map(|line| line.to_vec()).collect();
        match lines.pop() {
            Some(last) if last.is_empty() => (),
            Some(last) => lines.push(last),
            None => (),
        }
        Ok(lines)
    }
}

fn bytes_arg(bytes: &[u8]) -> &OsStr {
    OsStr::from_bytes(bytes)
}

fn malformed(helper_op: &'static str, line: &[u8]) -> InternalError {
    InternalError::MalformedHelperOutput { helper_op, line: BString::from(line) }
}
