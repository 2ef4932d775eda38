use canopy_tree::{Model, NodeId, Tree};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Folder;

impl Model for Folder {
    fn kind(&self) -> &str {
        "Folder"
    }
}

#[derive(Debug, Clone)]
enum Edit {
    Add { parent: usize, name: u8 },
    Move { node: usize, new_parent: usize },
    Remove { node: usize },
    Rename { node: usize, name: u8 },
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), any::<u8>()).prop_map(|(parent, name)| Edit::Add { parent, name }),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(node, new_parent)| Edit::Move { node, new_parent }),
        1 => any::<usize>().prop_map(|node| Edit::Remove { node }),
        1 => (any::<usize>(), any::<u8>()).prop_map(|(node, name)| Edit::Rename { node, name }),
    ]
}

fn pick(live: &[NodeId], raw: usize) -> NodeId {
    live[raw % live.len()]
}

fn apply(tree: &mut Tree, edit: &Edit) {
    let live: Vec<NodeId> = tree.walk(tree.root()).collect();
    // Rejected edits (cycles, root moves) are part of the exercise.
    match *edit {
        Edit::Add { parent, name } => {
            let _ = tree.add_child(pick(&live, parent), format!("N{name}"), Box::new(Folder));
        }
        Edit::Move { node, new_parent } => {
            let _ = tree.add_children(pick(&live, new_parent), &[pick(&live, node)]);
        }
        Edit::Remove { node } => {
            let _ = tree.remove(pick(&live, node));
        }
        Edit::Rename { node, name } => {
            let _ = tree.rename(pick(&live, node), format!("R{name}"));
        }
    }
}

fn check_invariants(tree: &Tree) {
    let root = tree.root();
    assert_eq!(tree.path_of(root), tree[root].name());
    assert!(tree.parent(root).is_none());

    let mut seen = 0;
    for id in tree.walk(root) {
        seen += 1;
        for &child in tree.children(id) {
            assert_eq!(tree.parent(child), Some(id));
            assert_eq!(
                tree.path_of(child),
                format!("{}.{}", tree.path_of(id), tree[child].name())
            );
        }
    }
    assert_eq!(seen, tree.node_count());
}

proptest! {
    #[test]
    fn prop_full_path_tracks_owner(edits in proptest::collection::vec(edit(), 0..60)) {
        let mut tree = Tree::new("Root", Box::new(Folder));
        for edit in &edits {
            apply(&mut tree, edit);
            check_invariants(&tree);
        }
    }

    #[test]
    fn prop_version_never_decreases(edits in proptest::collection::vec(edit(), 0..30)) {
        let mut tree = Tree::new("Root", Box::new(Folder));
        let mut last = tree.version();
        for edit in &edits {
            apply(&mut tree, edit);
            prop_assert!(tree.version() >= last);
            last = tree.version();
        }
    }
}

#[test]
fn test_detached_subtree_is_self_consistent() {
    let mut tree = Tree::new("Root", Box::new(Folder));
    let a = tree.add_child(tree.root(), "A", Box::new(Folder)).unwrap();
    let b = tree.add_child(a, "B", Box::new(Folder)).unwrap();
    tree.add_child(b, "C", Box::new(Folder)).unwrap();

    let detached = tree.remove(a).unwrap();
    check_invariants(&detached);
    check_invariants(&tree);
    assert_eq!(tree.node_count(), 1);
}
