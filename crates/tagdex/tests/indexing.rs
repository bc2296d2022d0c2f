//! End-to-end pipeline tests driven by a stub revision-control helper.
//!
//! The helper script serves canned responses from the fixture directory, so
//! each test describes a tiny repository (tags, blobs, token streams,
//! definition triples) and asserts the resulting index contents.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use bstr::BString;
use heed::EnvOpenOptions;
use tagdex::records::{DefEntry, RefEntry};
use tagdex::update::{IndexTags, IndexerConfig, TagIndexingResult};
use tagdex::{DefKind, Family, Index, Repo};
use tempfile::TempDir;

const HELPER_SCRIPT: &str = r#"#!/bin/sh
set -e
case "$1" in
    list-tags) cat "$TAGDEX_REPO_DIR/list-tags" ;;
    list-blobs) cat "$TAGDEX_REPO_DIR/list-blobs$2-$3" ;;
    get-blob) cat "$TAGDEX_REPO_DIR/blob-$2" ;;
    tokenize-file) cat "$TAGDEX_REPO_DIR/tokens-$3" ;;
    parse-defs) cat "$TAGDEX_REPO_DIR/defs-$2" ;;
    parse-docs) cat "$TAGDEX_REPO_DIR/docs-$2" ;;
    dts-comp) cat "$TAGDEX_REPO_DIR/dts-comp" ;;
    *) exit 1 ;;
esac
"#;

#[derive(Clone)]
struct Blob {
    hash: &'static str,
    basename: &'static str,
    path: &'static str,
    content: &'static str,
    tokens: Vec<&'static str>,
    defs: Vec<&'static str>,
    docs: Vec<&'static str>,
}

impl Blob {
    fn new(hash: &'static str, basename: &'static str, path: &'static str) -> Blob {
        Blob { hash, basename, path, content: "", tokens: vec![], defs: vec![], docs: vec![] }
    }

    fn content(mut self, content: &'static str) -> Blob {
        self.content = content;
        self
    }

    /// The boundary-marked token stream: alternating non-identifier and
    /// identifier chunks, non-identifier first, newlines spelled `\x01`.
    fn tokens(mut self, tokens: &[&'static str]) -> Blob {
        self.tokens = tokens.to_vec();
        self
    }

    /// `parse-defs` output lines: `<ident> <kind-char> <line>`.
    fn defs(mut self, defs: &[&'static str]) -> Blob {
        self.defs = defs.to_vec();
        self
    }

    /// `parse-docs` output lines: `<ident> <line>`.
    fn docs(mut self, docs: &[&'static str]) -> Blob {
        self.docs = docs.to_vec();
        self
    }
}

struct Fixture {
    index: Index,
    repo: Repo,
    config: IndexerConfig,
    fixtures: TempDir,
    _index_dir: TempDir,
}

impl Fixture {
    fn new(dts_comp: bool, worker_budget: usize) -> Fixture {
        let fixtures = TempDir::new().unwrap();
        let index_dir = TempDir::new().unwrap();

        let helper = fixtures.path().join("helper.sh");
        fs::write(&helper, HELPER_SCRIPT).unwrap();
        fs::set_permissions(&helper, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(fixtures.path().join("dts-comp"), if dts_comp { "1\n" } else { "0\n" })
            .unwrap();
        fs::write(fixtures.path().join("list-tags"), "").unwrap();

        let repo = Repo::new(&helper, fixtures.path()).unwrap();

        let options = EnvOpenOptions::new();
        let mut options = options.read_txn_without_tls();
        options.map_size(4096 * 2000);
        let index = Index::new(options, index_dir.path(), dts_comp).unwrap();

        let config = IndexerConfig { worker_budget, ..Default::default() };
        Fixture { index, repo, config, fixtures, _index_dir: index_dir }
    }

    fn add_tag(&self, name: &str, blobs: &[&Blob]) {
        let dir = self.fixtures.path();

        let mut tags = OpenOptions::new()
            .append(true)
            .open(dir.join("list-tags"))
            .unwrap();
        writeln!(tags, "{name}").unwrap();

        let with_filenames: Vec<String> =
            blobs.iter().map(|b| format!("{} {}", b.hash, b.basename)).collect();
        let with_paths: Vec<String> =
            blobs.iter().map(|b| format!("{} {}", b.hash, b.path)).collect();
        write_lines(&dir.join(format!("list-blobs-f-{name}")), &with_filenames);
        write_lines(&dir.join(format!("list-blobs-p-{name}")), &with_paths);

        for blob in blobs {
            fs::write(dir.join(format!("blob-{}", blob.hash)), blob.content).unwrap();
            write_lines(&dir.join(format!("tokens-{}", blob.hash)), &blob.tokens);
            write_lines(&dir.join(format!("defs-{}", blob.hash)), &blob.defs);
            write_lines(&dir.join(format!("docs-{}", blob.hash)), &blob.docs);
        }
    }

    fn run(&self) -> TagIndexingResult {
        IndexTags::new(&self.index, &self.repo, &self.config).execute().unwrap()
    }

    fn def_entries(&self, ident: &str) -> Option<Vec<DefEntry>> {
        let rtxn = self.index.read_txn().unwrap();
        let defs = self.index.definitions(&rtxn, ident.as_bytes()).unwrap();
        defs.map(|defs| defs.entries())
    }

    fn ref_entries(&self, ident: &str) -> Option<Vec<RefEntry>> {
        let rtxn = self.index.read_txn().unwrap();
        let refs = self.index.references(&rtxn, ident.as_bytes()).unwrap();
        refs.map(|refs| refs.entries())
    }

    fn num_blobs(&self) -> u64 {
        let rtxn = self.index.read_txn().unwrap();
        self.index.num_blobs(&rtxn).unwrap()
    }
}

fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line.as_ref().as_bytes());
        out.push(b'\n');
    }
    fs::write(path, out).unwrap();
}

fn ref_entry(id: u64, lines: &str, family: Family) -> RefEntry {
    RefEntry { id, lines: BString::from(lines), family }
}

#[test]
fn single_tag_single_file() {
    let fixture = Fixture::new(false, 5);
    let file = Blob::new("aaaa", "a.c", "a.c")
        .content("int foo;\nreturn foo;\n")
        .defs(&["foo v 1"])
        .tokens(&["", "int", " ", "foo", ";\x01", "return", " ", "foo", ";\x01"]);
    fixture.add_tag("v1", &[&file]);

    let result = fixture.run();
    assert_eq!(result, TagIndexingResult { indexed_tags: 1, new_blobs: 1 });

    assert_eq!(fixture.num_blobs(), 1);
    let rtxn = fixture.index.read_txn().unwrap();
    assert_eq!(fixture.index.blob_id(&rtxn, b"aaaa").unwrap(), Some(0));
    assert_eq!(fixture.index.blob_hash(&rtxn, 0).unwrap().unwrap(), b"aaaa");
    assert_eq!(fixture.index.blob_filename(&rtxn, 0).unwrap().unwrap(), b"a.c");

    let version = fixture.index.version(&rtxn, b"v1").unwrap().unwrap();
    assert_eq!(version.entries(), vec![(0, BString::from("a.c"))]);
    drop(rtxn);

    let defs = fixture.def_entries("foo").unwrap();
    assert_eq!(
        defs,
        vec![DefEntry { id: 0, kind: DefKind::Variable, line: 1, family: Family::C }]
    );

    // The definition line is not a reference; the use on line 2 is. The
    // undefined tokens produce nothing.
    assert_eq!(fixture.ref_entries("foo").unwrap(), vec![ref_entry(0, "2", Family::C)]);
    assert_eq!(fixture.ref_entries("int"), None);
    assert_eq!(fixture.ref_entries("return"), None);
}

#[test]
fn definition_line_does_not_reference_itself() {
    let fixture = Fixture::new(false, 5);
    let file = Blob::new("bbbb", "b.c", "lib/b.c")
        .defs(&["bar f 1"])
        .tokens(&[
            "",
            "static",
            " int ",
            "bar",
            "(void){return ",
            "bar_helper",
            "();}\x01\x01\x01\x01",
            "bar",
            "();\x01",
        ]);
    fixture.add_tag("v1", &[&file]);
    fixture.run();

    // `bar` is defined at line 1 and used again at line 5: only the use
    // survives. `bar_helper` is not defined anywhere.
    assert_eq!(fixture.ref_entries("bar").unwrap(), vec![ref_entry(0, "5", Family::C)]);
    assert_eq!(fixture.ref_entries("bar_helper"), None);
    assert_eq!(fixture.def_entries("bar").unwrap().len(), 1);
}

#[test]
fn kconfig_references_are_prefixed() {
    let fixture = Fixture::new(false, 5);
    let kconfig = Blob::new("cccc", "Kconfig", "Kconfig")
        .defs(&["CONFIG_FOO c 1"])
        .tokens(&["", "config", " ", "FOO", "\x01\t", "depends", " on ", "BAR", "\x01"]);
    let other = Blob::new("dddd", "Kconfig.debug", "lib/Kconfig.debug")
        .defs(&["CONFIG_BAR c 1"])
        .tokens(&["", "config", " ", "BAR", "\x01"]);
    fixture.add_tag("v1", &[&kconfig, &other]);
    fixture.run();

    // `BAR` on line 2 of the Kconfig blob is stored under its prefixed
    // name; the bare token never becomes a key.
    assert_eq!(
        fixture.ref_entries("CONFIG_BAR").unwrap(),
        vec![ref_entry(0, "2", Family::K)]
    );
    assert_eq!(fixture.ref_entries("BAR"), None);
    // `FOO` on the `config FOO` line is its own definition.
    assert_eq!(fixture.ref_entries("CONFIG_FOO"), None);
    assert_eq!(
        fixture.def_entries("CONFIG_FOO").unwrap(),
        vec![DefEntry { id: 0, kind: DefKind::Config, line: 1, family: Family::K }]
    );
}

#[test]
fn makefiles_only_reference_prefixed_tokens() {
    let fixture = Fixture::new(false, 5);
    let source = Blob::new("aaaa", "a.c", "a.c").defs(&["foo v 1"]).tokens(&["", "foo", ";\x01"]);
    let kconfig = Blob::new("dddd", "Kconfig", "Kconfig")
        .defs(&["CONFIG_BAR c 1"])
        .tokens(&["", "config", " ", "BAR", "\x01"]);
    let makefile = Blob::new("eeee", "Makefile", "Makefile")
        .tokens(&["", "foo", " ", "CONFIG_BAR", "\x01"]);
    fixture.add_tag("v1", &[&source, &kconfig, &makefile]);
    fixture.run();

    let makefile_id = {
        let rtxn = fixture.index.read_txn().unwrap();
        fixture.index.blob_id(&rtxn, b"eeee").unwrap().unwrap()
    };

    // `foo` is defined, but a bare token in a Makefile is never a
    // reference; the CONFIG_-prefixed one is.
    let foo_refs = fixture.ref_entries("foo").unwrap_or_default();
    assert!(foo_refs.iter().all(|entry| entry.id != makefile_id));
    assert_eq!(
        fixture.ref_entries("CONFIG_BAR").unwrap(),
        vec![ref_entry(makefile_id, "1", Family::M)]
    );
}

#[test]
fn reindexing_is_a_no_op() {
    let fixture = Fixture::new(false, 5);
    let file = Blob::new("aaaa", "a.c", "a.c")
        .defs(&["foo v 1"])
        .tokens(&["", "int", " ", "foo", ";\x01"]);
    fixture.add_tag("v1", &[&file]);
    fixture.run();

    let before = {
        let rtxn = fixture.index.read_txn().unwrap();
        fixture.index.stats(&rtxn).unwrap()
    };

    let result = fixture.run();
    assert_eq!(result, TagIndexingResult { indexed_tags: 0, new_blobs: 0 });

    let after = {
        let rtxn = fixture.index.read_txn().unwrap();
        fixture.index.stats(&rtxn).unwrap()
    };
    assert_eq!(before, after);
    assert_eq!(fixture.num_blobs(), 1);
    assert_eq!(fixture.def_entries("foo").unwrap().len(), 1);
}

#[test]
fn shared_blobs_are_indexed_once() {
    let fixture = Fixture::new(false, 10);
    let x = Blob::new("1111", "x.c", "x.c").defs(&["foo v 1"]).tokens(&["", "int", " ", "foo", ";\x01"]);
    fixture.add_tag("v1", &[&x]);
    let first = fixture.run();
    assert_eq!(first, TagIndexingResult { indexed_tags: 1, new_blobs: 1 });

    let y = Blob::new("2222", "y.c", "sub/y.c")
        .defs(&["helper f 1"])
        .tokens(&["", "void", " ", "helper", "(void){}\x01"]);
    fixture.add_tag("v2", &[&x, &y]);
    let second = fixture.run();
    assert_eq!(second, TagIndexingResult { indexed_tags: 1, new_blobs: 1 });

    assert_eq!(fixture.num_blobs(), 2);
    let rtxn = fixture.index.read_txn().unwrap();
    let v1 = fixture.index.version(&rtxn, b"v1").unwrap().unwrap();
    assert_eq!(v1.entries(), vec![(0, BString::from("x.c"))]);
    let v2 = fixture.index.version(&rtxn, b"v2").unwrap().unwrap();
    assert_eq!(
        v2.entries(),
        vec![(0, BString::from("x.c")), (1, BString::from("sub/y.c"))]
    );
    drop(rtxn);

    // x.c was not re-extracted for v2: one definition entry, not two.
    assert_eq!(fixture.def_entries("foo").unwrap().len(), 1);
    assert_eq!(fixture.def_entries("helper").unwrap().len(), 1);
}

#[test]
fn tag_with_no_new_blobs_only_touches_versions() {
    let fixture = Fixture::new(false, 5);
    let file = Blob::new("aaaa", "a.c", "a.c")
        .defs(&["foo v 1"])
        .tokens(&["", "int", " ", "foo", ";\x01"]);
    fixture.add_tag("v1", &[&file]);
    fixture.run();

    let before = {
        let rtxn = fixture.index.read_txn().unwrap();
        fixture.index.stats(&rtxn).unwrap()
    };

    fixture.add_tag("v2", &[&file]);
    let result = fixture.run();
    assert_eq!(result, TagIndexingResult { indexed_tags: 1, new_blobs: 0 });

    let after = {
        let rtxn = fixture.index.read_txn().unwrap();
        fixture.index.stats(&rtxn).unwrap()
    };
    assert_eq!(after.versions, before.versions + 1);
    assert_eq!(
        (after.vars, after.blobs, after.definitions, after.references, after.doc_comments),
        (before.vars, before.blobs, before.definitions, before.references, before.doc_comments)
    );
}

#[test]
fn empty_tag_produces_an_empty_path_list() {
    let fixture = Fixture::new(false, 5);
    fixture.add_tag("v0", &[]);
    let result = fixture.run();
    assert_eq!(result, TagIndexingResult { indexed_tags: 1, new_blobs: 0 });

    let rtxn = fixture.index.read_txn().unwrap();
    let version = fixture.index.version(&rtxn, b"v0").unwrap().unwrap();
    assert!(version.is_empty());
    let stats = fixture.index.stats(&rtxn).unwrap();
    assert_eq!(stats.versions, 1);
    assert_eq!(stats.blobs, 0);
    assert_eq!(stats.definitions, 0);
    assert_eq!(stats.references, 0);
    assert_eq!(fixture.index.num_blobs(&rtxn).unwrap(), 0);
}

#[test]
fn doc_comment_anchors_are_recorded() {
    let fixture = Fixture::new(false, 5);
    let file = Blob::new("aaaa", "a.c", "a.c")
        .docs(&["foo 3", "foo 12", "bar 7"])
        .tokens(&[""]);
    fixture.add_tag("v1", &[&file]);
    fixture.run();

    let rtxn = fixture.index.read_txn().unwrap();
    let foo = fixture.index.doc_comments(&rtxn, b"foo").unwrap().unwrap();
    assert_eq!(foo.entries(), vec![ref_entry(0, "3,12", Family::C)]);
    let bar = fixture.index.doc_comments(&rtxn, b"bar").unwrap().unwrap();
    assert_eq!(bar.entries(), vec![ref_entry(0, "7", Family::C)]);
}

#[test]
fn compatible_strings_are_cross_linked() {
    let fixture = Fixture::new(true, 5);
    let driver = Blob::new("f111", "drv.c", "drivers/drv.c")
        .content("static const struct of_device_id ids[] = {\n\t{ .compatible = \"vendor,foo\" },\n};\n")
        .tokens(&[""]);
    let dts = Blob::new("f333", "board.dts", "arch/boot/dts/board.dts")
        .content("node {\n\tcompatible = \"vendor,foo\", \"vendor,bar\";\n};\n")
        .tokens(&[""]);
    let binding = Blob::new("f222", "foo.yaml", "Documentation/devicetree/bindings/foo.yaml")
        .content("compatible:\n  const: vendor,foo\n  const: vendor,missing\n");
    fixture.add_tag("v1", &[&driver, &dts, &binding]);
    fixture.run();

    let rtxn = fixture.index.read_txn().unwrap();

    let foo = fixture.index.compatible(&rtxn, b"vendor,foo").unwrap().unwrap();
    assert_eq!(
        foo.entries(),
        vec![ref_entry(0, "2", Family::C), ref_entry(1, "2", Family::D)]
    );
    let bar = fixture.index.compatible(&rtxn, b"vendor,bar").unwrap().unwrap();
    assert_eq!(bar.entries(), vec![ref_entry(1, "2", Family::D)]);

    // The binding document occurrence is recorded because `vendor,foo`
    // exists in the compatible index; `vendor,missing` does not.
    let foo_docs = fixture.index.compatible_docs(&rtxn, b"vendor,foo").unwrap().unwrap();
    assert_eq!(foo_docs.entries(), vec![ref_entry(2, "2", Family::B)]);
    assert!(fixture.index.compatible_docs(&rtxn, b"vendor,missing").unwrap().is_none());
}
