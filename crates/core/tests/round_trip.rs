//! Integration test: import the fixtures, export them as speedscope JSON and
//! import the result again. Names, weights and tree shape must survive.

use flamescope_core::model::{Profile, ProfileGroup, ValueUnit};
use flamescope_core::parsers::{export_profile_group, import_profile_group};
use pretty_assertions::assert_eq;

/// Pre-order `depth name self/total` lines of the chronological tree.
fn shape(profile: &Profile) -> Vec<String> {
    let tree = profile.tree();
    tree.nodes()
        .map(|(id, node)| {
            format!(
                "{} {} {}/{}",
                tree.depth(id),
                profile.frames().frame(node.frame).name,
                node.self_weight,
                node.total_weight
            )
        })
        .collect()
}

fn round_trip(group: &ProfileGroup) -> ProfileGroup {
    let json = export_profile_group(group).expect("export failed");
    import_profile_group("exported.json", json.as_bytes())
        .expect("re-import failed")
        .expect("exported file not recognized")
}

fn assert_same(before: &ProfileGroup, after: &ProfileGroup) {
    assert_eq!(before.name, after.name);
    assert_eq!(before.index_to_view, after.index_to_view);
    assert_eq!(before.len(), after.len());
    for (a, b) in before.profiles.iter().zip(&after.profiles) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.unit(), b.unit());
        assert_eq!(a.total_weight(), b.total_weight());
        assert_eq!(a.total_non_idle_weight(), b.total_non_idle_weight());
        assert_eq!(shape(a), shape(b));
    }
}

#[test]
fn speedscope_fixture_round_trips() {
    let data = include_bytes!("fixtures/recursive.speedscope.json");
    let group = import_profile_group("recursive.speedscope.json", data)
        .unwrap()
        .unwrap();

    assert_eq!(group.name, "interpreter");
    assert_eq!(group.index_to_view, 1);
    let main_thread = &group.profiles[0];
    assert_eq!(main_thread.unit(), ValueUnit::Milliseconds);
    assert_eq!(main_thread.total_weight(), 100.0);
    assert_eq!(
        shape(main_thread),
        vec![
            "0 main 10/80",
            "1 eval 20/50",
            "2 eval 20/30",
            "3 helper 10/10",
            "1 parse 20/20",
        ]
    );
    assert_eq!(
        shape(&group.profiles[1]),
        vec![
            "0 main 1/11",
            "1 parse 5/5",
            "1 eval 0/5",
            "2 helper 5/5",
        ]
    );

    let again = round_trip(&group);
    assert_same(&group, &again);

    let parse = again.profiles[0]
        .frames()
        .iter()
        .find(|(_, f)| f.name == "parse")
        .map(|(_, f)| (f.file.clone(), f.line))
        .unwrap();
    assert_eq!(parse, (Some("parse.c".to_string()), Some(42)));
}

#[test]
fn shared_frames_are_written_once() {
    let data = include_bytes!("fixtures/recursive.speedscope.json");
    let group = import_profile_group("recursive.speedscope.json", data)
        .unwrap()
        .unwrap();
    let json = export_profile_group(&group).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["shared"]["frames"].as_array().unwrap().len(), 4);
    assert_eq!(value["profiles"].as_array().unwrap().len(), 2);
}

#[test]
fn collapsed_fixture_round_trips() {
    let data = include_bytes!("fixtures/perf.collapsed.txt");
    let group = import_profile_group("perf.collapsed.txt", data)
        .unwrap()
        .unwrap();
    assert_eq!(group.profiles[0].name(), "perf.collapsed.txt");
    assert_eq!(group.profiles[0].total_weight(), 24.0);
    assert_eq!(group.profiles[0].tree().roots().len(), 2);

    let again = round_trip(&group);
    assert_same(&group, &again);
}

#[test]
fn renamed_frames_export_their_new_names() {
    let data = include_bytes!("fixtures/perf.collapsed.txt");
    let mut group = import_profile_group("perf.collapsed.txt", data)
        .unwrap()
        .unwrap();
    let upper = |f: &flamescope_core::model::Frame| Some(f.name.to_uppercase());
    let renamed = group.profiles[0].remap_symbols(&upper);
    assert_eq!(renamed, 6);

    let again = round_trip(&group);
    let names: Vec<&str> = again.profiles[0]
        .frames()
        .iter()
        .map(|(_, f)| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["MAIN", "FOO", "FOOBAR", "BAR", "BAZ", "IDLE_LOOP"]);
}
