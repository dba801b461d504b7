//! Each load- and join-time failure has its own error kind; exercise them
//! through the public loading and pipeline entry points.

use std::path::PathBuf;

use mafjoin::error::JoinError;
use mafjoin::genomes::Genomes;
use mafjoin::maf::{load_maf_set, LoadOptions};
use mafjoin::pipeline::{run, JoinConfig};

fn load(text: &str) -> Result<(), JoinError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.maf");
    std::fs::write(&path, text).unwrap();
    let mut genomes = Genomes::new();
    let opts = LoadOptions {
        branch_length: 0.1,
        treeless_root: None,
        max_input_blk_width: None,
    };
    load_maf_set(&path, &mut genomes, &opts).map(|_| ())
}

#[test]
fn missing_maf_header() {
    let err = load("a tree=\"(a.1:1)b.1;\"\ns a.1 0 1 + 5 A\ns b.1 0 1 + 5 A\n").unwrap_err();
    assert!(matches!(err, JoinError::MalformedMaf { line: 1, .. }));
}

#[test]
fn truncated_s_line() {
    let err = load("##maf version=1\n\na tree=\"(a.1:1)b.1;\"\ns a.1 0 1 + A\n").unwrap_err();
    match err {
        JoinError::MalformedMaf { line, msg, .. } => {
            assert_eq!(line, 4);
            assert!(msg.contains("s line"), "{msg}");
        }
        other => panic!("expected MalformedMaf, got {other}"),
    }
}

#[test]
fn bad_strand_field() {
    let err = load("##maf version=1\n\na tree=\"(a.1:1)b.1;\"\ns a.1 0 1 * 5 A\n").unwrap_err();
    match err {
        JoinError::MalformedMaf { msg, .. } => assert!(msg.contains("strand"), "{msg}"),
        other => panic!("expected MalformedMaf, got {other}"),
    }
}

#[test]
fn row_name_without_dot() {
    let err = load("##maf version=1\n\na tree=\"(baboon:1)b.1;\"\ns baboon 0 1 + 5 A\ns b.1 0 1 + 5 A\n")
        .unwrap_err();
    assert!(matches!(err, JoinError::MissingDot { .. }));
}

#[test]
fn disagreeing_source_sizes() {
    let err = load(
        "##maf version=1

a tree=\"(a.1:1)b.1;\"
s a.1 0 1 + 5 A
s b.1 0 1 + 9 A

a tree=\"(a.1:1)b.1;\"
s a.1 1 1 + 6 A
s b.1 1 1 + 9 A
",
    )
    .unwrap_err();
    match err {
        JoinError::InconsistentSize { org_seq, known, new } => {
            assert_eq!(org_seq, "a.1");
            assert_eq!((known, new), (5, 6));
        }
        other => panic!("expected InconsistentSize, got {other}"),
    }
}

#[test]
fn base_count_mismatch() {
    let err = load("##maf version=1\n\na tree=\"(a.1:1)b.1;\"\ns a.1 0 3 + 5 A-A\ns b.1 0 3 + 5 AAA\n")
        .unwrap_err();
    match err {
        JoinError::MalformedRow { org_seq, found, declared } => {
            assert_eq!(org_seq, "a.1");
            assert_eq!((found, declared), (2, 3));
        }
        other => panic!("expected MalformedRow, got {other}"),
    }
}

#[test]
fn tree_with_wrong_row_count() {
    let err = load("##maf version=1\n\na tree=\"(a.1:1,c.1:1)b.1;\"\ns a.1 0 1 + 5 A\ns b.1 0 1 + 5 A\n")
        .unwrap_err();
    assert!(matches!(
        err,
        JoinError::TreeRowCountMismatch {
            tree_nodes: 3,
            rows: 2
        }
    ));
}

#[test]
fn tree_with_wrong_label() {
    let err = load("##maf version=1\n\na tree=\"(c.1:1)b.1;\"\ns a.1 0 1 + 5 A\ns b.1 0 1 + 5 A\n")
        .unwrap_err();
    match err {
        JoinError::TreeLabelMismatch { label, org_seq } => {
            assert_eq!(label, "c.1");
            assert_eq!(org_seq, "a.1");
        }
        other => panic!("expected TreeLabelMismatch, got {other}"),
    }
}

#[test]
fn unparseable_tree_attribute() {
    let err = load("##maf version=1\n\na tree=\"(a.1:1\"\ns a.1 0 1 + 5 A\n").unwrap_err();
    match err {
        JoinError::MalformedMaf { msg, .. } => assert!(msg.contains("newick"), "{msg}"),
        other => panic!("expected MalformedMaf, got {other}"),
    }
}

#[test]
fn overlapping_roots_within_a_block() {
    let err = load(
        "##maf version=1\n\na tree=\"(b.1:1)b.1;\"\ns b.1 0 3 + 9 ACG\ns b.1 1 3 + 9 CGT\n",
    )
    .unwrap_err();
    assert!(matches!(err, JoinError::OverlappingRoots { .. }));
}

#[test]
fn missing_input_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.maf");
    let other = dir.path().join("in2.maf");
    std::fs::write(&other, "##maf version=1\n").unwrap();
    let out: PathBuf = dir.path().join("out.maf");
    let config = JoinConfig::new("hg", missing, other, out.clone());
    let err = run(&config).unwrap_err();
    assert!(matches!(err, JoinError::Io(_)));
    assert!(!out.exists());
}
