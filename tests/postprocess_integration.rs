use foldrank::postprocess::{dedup_dir, filter_dir, keep_topn_dir, run_files, DocList};
use foldrank::run::load_trec_run;
use foldrank::stage::DONE_MARKER;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_runs(dir: &Path) {
    fs::write(
        dir.join("searcher_a"),
        "1 Q0 d1.p0 1 9.0 x\n1 Q0 d2.p0 2 8.0 x\n1 Q0 d1.p3 3 7.0 x\n1 Q0 d3.p1 4 6.0 x\n",
    )
    .unwrap();
    fs::write(
        dir.join("searcher_b"),
        "1 Q0 d3.p0 1 5.0 x\n1 Q0 d2.p1 2 4.0 x\n2 Q0 d4.p0 1 3.0 x\n",
    )
    .unwrap();
    fs::write(dir.join(DONE_MARKER), "done\n").unwrap();
}

#[test]
fn test_run_files_skip_marker() {
    let temp = TempDir::new().unwrap();
    write_runs(temp.path());

    let names: Vec<String> = run_files(temp.path())
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["searcher_a", "searcher_b"]);
}

#[test]
fn test_dedup_then_topn_over_directory() {
    let temp = TempDir::new().unwrap();
    write_runs(temp.path());

    dedup_dir(temp.path(), ".", Some(2)).unwrap();

    let a = load_trec_run(&temp.path().join("searcher_a")).unwrap();
    let docs = a.get("1").unwrap();
    assert_eq!(docs.keys().collect::<Vec<_>>(), vec!["d1", "d2"]);
    assert_eq!(docs.get("d1"), Some(&9.0));

    let b = load_trec_run(&temp.path().join("searcher_b")).unwrap();
    assert_eq!(b.get("2").unwrap().keys().collect::<Vec<_>>(), vec!["d4"]);

    // The marker is never parsed as a run
    assert_eq!(
        fs::read_to_string(temp.path().join(DONE_MARKER)).unwrap(),
        "done\n"
    );
}

#[test]
fn test_filter_with_per_query_remove_list() {
    let temp = TempDir::new().unwrap();
    write_runs(temp.path());
    let list_path = temp.path().join("remove.txt");
    fs::write(&list_path, "1 d2.p0\n1 d2.p1\n").unwrap();
    let remove = DocList::load(&list_path).unwrap();
    fs::remove_file(&list_path).unwrap();

    filter_dir(temp.path(), Some(&remove), None, None).unwrap();

    let a = load_trec_run(&temp.path().join("searcher_a")).unwrap();
    assert!(!a.get("1").unwrap().contains_key("d2.p0"));
    assert_eq!(a.get("1").unwrap().len(), 3);

    let b = load_trec_run(&temp.path().join("searcher_b")).unwrap();
    assert_eq!(b.get("1").unwrap().keys().collect::<Vec<_>>(), vec!["d3.p0"]);
    assert_eq!(b.get("2").unwrap().len(), 1);
}

#[test]
fn test_keep_list_and_topn() {
    let temp = TempDir::new().unwrap();
    write_runs(temp.path());
    let keep = DocList::global(["d1.p3", "d3.p1", "d3.p0", "d4.p0"]);

    filter_dir(temp.path(), None, Some(&keep), Some(1)).unwrap();

    let a = load_trec_run(&temp.path().join("searcher_a")).unwrap();
    assert_eq!(a.get("1").unwrap().keys().collect::<Vec<_>>(), vec!["d1.p3"]);
}

#[test]
fn test_topn_only() {
    let temp = TempDir::new().unwrap();
    write_runs(temp.path());

    keep_topn_dir(temp.path(), 1).unwrap();

    for path in run_files(temp.path()).unwrap() {
        let run = load_trec_run(&path).unwrap();
        assert!(run.values().all(|docs| docs.len() == 1));
    }
}

#[test]
fn test_filter_without_lists_is_rejected() {
    let temp = TempDir::new().unwrap();
    write_runs(temp.path());
    assert!(filter_dir(temp.path(), None, None, Some(1)).is_err());
}
