//! Top-down pruning of a universe.

use std::collections::BTreeMap;

use tracing::debug;

use coursepub_shared::{Artifact, Collection, KeyPath, Publication, TreeNode, Universe};

/// A borrowed node of any level below the universe, as seen by a predicate.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Collection(&'a Collection),
    Publication(&'a Publication),
    Artifact(&'a Artifact),
}

/// Configuration for [`filter_nodes_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    /// Drop publications left without artifacts and collections left without
    /// publications.
    pub remove_empty_nodes: bool,
}

/// Hooks invoked for every node the predicate is asked about.
pub trait FilterCallbacks {
    /// The predicate kept the node.
    fn on_hit(&mut self, _key_path: &KeyPath, _node: NodeRef<'_>) {}

    /// The predicate removed the node, and with it its subtree.
    fn on_miss(&mut self, _key_path: &KeyPath, _node: NodeRef<'_>) {}
}

/// Callbacks that do nothing.
pub struct SilentCallbacks;

impl FilterCallbacks for SilentCallbacks {}

/// Keep only the nodes for which `predicate` returns true.
///
/// Applied top-down: a node the predicate rejects is removed with its whole
/// subtree, and the predicate is not asked about its descendants.
pub fn filter_nodes<P>(universe: &Universe, predicate: P) -> Universe
where
    P: FnMut(&KeyPath, NodeRef<'_>) -> bool,
{
    filter_nodes_with(
        universe,
        predicate,
        &FilterOptions::default(),
        &mut SilentCallbacks,
    )
}

/// [`filter_nodes`] with options and callbacks.
pub fn filter_nodes_with<P>(
    universe: &Universe,
    mut predicate: P,
    options: &FilterOptions,
    callbacks: &mut dyn FilterCallbacks,
) -> Universe
where
    P: FnMut(&KeyPath, NodeRef<'_>) -> bool,
{
    let mut keep = |key_path: &KeyPath, node: NodeRef<'_>| {
        let hit = predicate(key_path, node);
        if hit {
            callbacks.on_hit(key_path, node);
        } else {
            debug!(node = %key_path, "filtered out");
            callbacks.on_miss(key_path, node);
        }
        hit
    };

    let mut collections = BTreeMap::new();
    for (collection_key, collection) in universe.children() {
        let base = KeyPath::collection(collection_key);
        if !keep(&base, NodeRef::Collection(collection)) {
            continue;
        }

        let mut publications = BTreeMap::new();
        for (publication_key, publication) in collection.children() {
            let key_path = base.publication(publication_key);
            if !keep(&key_path, NodeRef::Publication(publication)) {
                continue;
            }

            let artifacts: BTreeMap<String, Artifact> = publication
                .children()
                .iter()
                .filter(|(key, artifact)| {
                    keep(&key_path.artifact(key.as_str()), NodeRef::Artifact(artifact))
                })
                .map(|(key, artifact)| (key.clone(), artifact.clone()))
                .collect();

            if options.remove_empty_nodes && artifacts.is_empty() {
                continue;
            }
            publications.insert(publication_key.clone(), publication.with_children(artifacts));
        }

        if options.remove_empty_nodes && publications.is_empty() {
            continue;
        }
        collections.insert(collection_key.clone(), collection.with_children(publications));
    }

    universe.with_children(collections)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use coursepub_shared::{Metadata, PublicationSchema, UnbuiltArtifact};

    use super::*;

    fn universe() -> Universe {
        let mut collections = BTreeMap::new();
        for collection_key in ["homeworks", "lectures"] {
            let mut collection = Collection::new(PublicationSchema::permissive());
            for publication_key in ["01", "02"] {
                let mut publication = Publication::new(Metadata::new());
                for artifact_key in ["notes.pdf", "solution.pdf"] {
                    let workdir = PathBuf::from(format!("/src/{collection_key}/{publication_key}"));
                    publication.artifacts.insert(
                        artifact_key.into(),
                        Artifact::Unbuilt(UnbuiltArtifact::new(artifact_key, workdir)),
                    );
                }
                collection
                    .publications
                    .insert(publication_key.into(), publication);
            }
            collections.insert(collection_key.into(), collection);
        }
        Universe::new(collections)
    }

    fn keys(universe: &Universe) -> Vec<String> {
        universe.artifacts().into_iter().map(|(k, _)| k.to_string()).collect()
    }

    #[test]
    fn keep_everything_is_identity() {
        let original = universe();
        assert_eq!(filter_nodes(&original, |_, _| true), original);
    }

    #[test]
    fn removing_a_collection_removes_its_subtree() {
        let original = universe();
        let filtered = filter_nodes(&original, |path, node| match node {
            NodeRef::Collection(_) => path.collection != "homeworks",
            // would keep everything on its own
            _ => true,
        });

        assert_eq!(
            filtered.collections.keys().collect::<Vec<_>>(),
            ["lectures"]
        );
        assert!(keys(&filtered).iter().all(|k| k.starts_with("lectures/")));
    }

    #[test]
    fn descendants_of_removed_nodes_are_not_visited() {
        let original = universe();
        let mut asked = Vec::new();
        filter_nodes(&original, |path, _| {
            asked.push(path.to_string());
            path.publication.as_deref() != Some("02")
        });

        assert!(asked.contains(&"lectures/02".to_string()));
        assert!(!asked.contains(&"lectures/02/notes.pdf".to_string()));
    }

    #[test]
    fn filtering_never_adds_nodes() {
        let original = universe();
        let filtered =
            filter_nodes(&original, |path, _| path.artifact.as_deref() != Some("notes.pdf"));

        let before = keys(&original);
        let after = keys(&filtered);
        assert_eq!(after.len(), 4);
        assert!(after.iter().all(|k| before.contains(k)));
        // parents of removed artifacts remain
        assert_eq!(filtered.publications().len(), 4);
    }

    #[test]
    fn remove_empty_nodes() {
        let original = universe();
        let only_homework_01 = |path: &KeyPath, node: NodeRef<'_>| match node {
            NodeRef::Artifact(_) => {
                path.collection == "homeworks" && path.publication.as_deref() == Some("01")
            }
            _ => true,
        };

        let kept = filter_nodes(&original, only_homework_01);
        assert_eq!(kept.publications().len(), 4);

        let pruned = filter_nodes_with(
            &original,
            only_homework_01,
            &FilterOptions {
                remove_empty_nodes: true,
            },
            &mut SilentCallbacks,
        );
        assert_eq!(pruned.collections.keys().collect::<Vec<_>>(), ["homeworks"]);
        assert_eq!(pruned.publications().len(), 1);
        assert_eq!(keys(&pruned), ["homeworks/01/notes.pdf", "homeworks/01/solution.pdf"]);
    }

    #[test]
    fn callbacks_report_hits_and_misses() {
        #[derive(Default)]
        struct Counter {
            hits: usize,
            misses: Vec<String>,
        }

        impl FilterCallbacks for Counter {
            fn on_hit(&mut self, _key_path: &KeyPath, _node: NodeRef<'_>) {
                self.hits += 1;
            }
            fn on_miss(&mut self, key_path: &KeyPath, _node: NodeRef<'_>) {
                self.misses.push(key_path.to_string());
            }
        }

        let mut counter = Counter::default();
        filter_nodes_with(
            &universe(),
            |path, _| path.collection == "lectures",
            &FilterOptions::default(),
            &mut counter,
        );

        assert_eq!(counter.misses, ["homeworks"]);
        // lectures, its 2 publications, and their 4 artifacts
        assert_eq!(counter.hits, 7);
    }
}
