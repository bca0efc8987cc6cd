//! End-to-end scenarios driven through the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
    path.to_str().unwrap().to_string()
}

fn xmlkit() -> Command {
    Command::cargo_bin("xmlkit").unwrap()
}

#[test]
fn cat_wraps_two_documents() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(&dir, "a.xml", "<a/>");
    let b = write_file(&dir, "b.xml", "<b/>");
    xmlkit()
        .args(["cat", &a, &b])
        .assert()
        .success()
        .stdout("<?xml version=\"1.0\"?>\n<root>\n<a/><b/></root>\n");
}

#[test]
fn cat_round_trips_a_document() {
    let dir = tempfile::tempdir().unwrap();
    let doc = "<r a=\"1\"><x>hi &amp; bye</x><!-- c --></r>";
    let f = write_file(&dir, "doc.xml", doc);
    xmlkit()
        .args(["cat", &f])
        .assert()
        .success()
        .stdout(format!("<?xml version=\"1.0\"?>\n<root>\n{doc}</root>\n"));
}

#[test]
fn grep_positive_match() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r><x>hello</x><y>world</y></r>");
    xmlkit()
        .args(["grep", "hello", &f])
        .assert()
        .success()
        .stdout(predicate::str::contains("<x>hello</x>"))
        .stdout(predicate::str::contains("<root>"))
        .stdout(predicate::str::contains("world").not());
}

#[test]
fn grep_no_match_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r><x>hello</x></r>");
    xmlkit()
        .args(["grep", "absent", &f])
        .assert()
        .code(1);
}

#[test]
fn grep_inverted_match() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r><x>hello</x><y>world</y></r>");
    xmlkit()
        .args(["grep", "-v", "world", &f])
        .assert()
        .success()
        .stdout(predicate::str::contains("<x>hello</x>"))
        .stdout(predicate::str::contains("<y>world</y>").not());
}

#[test]
fn sed_substitutes_leaf_values() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r>foo foo</r>");
    xmlkit()
        .args(["sed", "-e", "s/foo/bar/g", &f])
        .assert()
        .success()
        .stdout(predicate::str::contains("<r>bar bar</r>"));
}

#[test]
fn sed_preserves_structure() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<a><b>x</b><c>y</c></a>");
    xmlkit()
        .args(["sed", "-e", "s/x/z/", &f])
        .assert()
        .success()
        .stdout(predicate::str::contains("<a><b>z</b><c>y</c></a>"));
}

#[test]
fn echo_renders_bracketed_string() {
    xmlkit()
        .args(["echo", "[a/b]hello"])
        .assert()
        .success()
        .stdout("<?xml version=\"1.0\"?>\n<a><b>hello</b></a>\n");
}

#[test]
fn unecho_echo_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<a><b>x</b><c>y</c></a>");
    let out = xmlkit().args(["unecho", &f]).assert().success();
    let bracketed = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    xmlkit()
        .args(["echo", bracketed.trim_end()])
        .assert()
        .success()
        .stdout(predicate::str::contains("<a><b>x</b><c>y</c></a>"));
}

#[test]
fn rm_removes_selected_subtree() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r><x>del</x><y>keep</y></r>");
    xmlkit()
        .args(["rm", &f, ":/r/x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<y>keep</y>"))
        .stdout(predicate::str::contains("del").not());
}

#[test]
fn rm_write_files_rewrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r><x>del</x><y>keep</y></r>");
    xmlkit()
        .args(["rm", "--write-files", &f, ":/r/x"])
        .assert()
        .success();
    let after = std::fs::read_to_string(&f).unwrap();
    assert!(after.contains("<y>keep</y>"));
    assert!(!after.contains("del"));
    // no rollback temp left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .contains(".xmlkit.")
        })
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn cp_replaces_selection_in_target() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_file(&dir, "src.xml", "<r><s>NEW</s></r>");
    let dst = write_file(&dir, "dst.xml", "<r><t>OLD</t></r>");
    xmlkit()
        .args(["cp", &src, ":/r/s", &dst, ":/r/t"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<s>NEW</s>"))
        .stdout(predicate::str::contains("OLD").not());
}

#[test]
fn wc_counts_tags() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<r><a>1</a><b>2</b></r>");
    xmlkit()
        .args(["wc", &f])
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn fixtags_repairs_unclosed_tags() {
    let dir = tempfile::tempdir().unwrap();
    let f = write_file(&dir, "t.xml", "<p>Hello <b>world");
    xmlkit()
        .args(["fixtags", "--root-wrap", &f])
        .assert()
        .success()
        .stdout(predicate::str::contains("<root>"))
        .stdout(predicate::str::contains("</b>"))
        .stdout(predicate::str::contains("</p>"))
        .stdout(predicate::str::contains("</root>"));
}

#[test]
fn fixtags_keeps_well_formed_input() {
    let dir = tempfile::tempdir().unwrap();
    let doc = "<a><b>x</b></a>";
    let f = write_file(&dir, "t.xml", doc);
    xmlkit()
        .args(["fixtags", &f])
        .assert()
        .success()
        .stdout(doc.to_string());
}

#[test]
fn usage_error_exits_two() {
    xmlkit().args(["rm", "a.xml", "b.xml"]).assert().code(2);
}

#[test]
fn stdin_is_default_input() {
    xmlkit()
        .args(["cat"])
        .write_stdin("<a>text</a>")
        .assert()
        .success()
        .stdout(predicate::str::contains("<a>text</a>"));
}
