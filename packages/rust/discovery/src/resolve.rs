//! Resolving a single declaration file in the context of its source tree.

use std::path::{Path, PathBuf};

use tracing::debug;

use coursepub_shared::{
    Collection, DEFAULT_COLLECTION, DiscoveryError, KeyPath, Publication, PublicationSchema,
};

use crate::DiscoverOptions;
use crate::parser::{PublicationContext, read_collection_file, read_publication_file};

/// A declaration file with interpolation applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Collection(Collection),
    Publication(Publication),
}

/// Read the collection or publication file at `path` as [`discover`] would.
///
/// A publication file is validated against the collection file one directory
/// up, if there is one, and otherwise treated as a stand-alone publication.
/// In an ordered collection the preceding publications are resolved too, so
/// that `${previous.*}` sees the same values it does during discovery.
///
/// [`discover`]: crate::discover
pub fn resolve(path: &Path, options: &DiscoverOptions) -> Result<Resolved, DiscoveryError> {
    let path = std::path::absolute(path).map_err(|e| DiscoveryError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if name == options.collection_file {
        return read_collection_file(&path, &options.vars).map(Resolved::Collection);
    }
    if name != options.publication_file {
        return Err(DiscoveryError::malformed(
            &path,
            format!(
                "expected a {} or {} file",
                options.collection_file, options.publication_file
            ),
        ));
    }

    let publication_dir = parent(&path)?;
    let publication_key = dir_name(publication_dir);
    let collection_dir = publication_dir
        .parent()
        .filter(|dir| dir.join(&options.collection_file).is_file());

    let Some(collection_dir) = collection_dir else {
        debug!(path = %path.display(), "resolving stand-alone publication");
        let schema = PublicationSchema::permissive();
        let ctx = context(DEFAULT_COLLECTION, &publication_key, &schema, options, None);
        return read_publication(&path, &ctx).map(Resolved::Publication);
    };

    let collection_key = dir_name(collection_dir);
    let collection =
        read_collection_file(&collection_dir.join(&options.collection_file), &options.vars)?;
    let schema = &collection.publication_schema;

    if schema.is_ordered {
        let mut previous: Option<Publication> = None;
        for (key, dir) in publication_dirs(collection_dir, options)? {
            let ctx = context(&collection_key, &key, schema, options, previous.as_ref());
            let publication = read_publication(&dir.join(&options.publication_file), &ctx)?;
            if dir == publication_dir {
                return Ok(Resolved::Publication(publication));
            }
            previous = Some(publication);
        }
        // hidden or skipped: discovery would never give it a predecessor
    }

    let ctx = context(&collection_key, &publication_key, schema, options, None);
    read_publication(&path, &ctx).map(Resolved::Publication)
}

fn context<'a>(
    collection_key: &'a str,
    publication_key: &'a str,
    schema: &'a PublicationSchema,
    options: &'a DiscoverOptions,
    previous: Option<&'a Publication>,
) -> PublicationContext<'a> {
    PublicationContext {
        collection_key,
        publication_key,
        schema,
        vars: &options.vars,
        previous,
    }
}

/// Read a publication file and attach its artifacts.
fn read_publication(
    path: &Path,
    ctx: &PublicationContext<'_>,
) -> Result<Publication, DiscoveryError> {
    let declaration = read_publication_file(path, ctx)?;
    let key_path = KeyPath::collection(ctx.collection_key).publication(ctx.publication_key);

    let mut publication = declaration.publication;
    publication.artifacts = crate::scan_artifacts(&key_path, parent(path)?, declaration.artifacts);
    Ok(publication)
}

/// Publication directories of a collection in key order, filtered as the
/// discovery walk filters them.
fn publication_dirs(
    collection_dir: &Path,
    options: &DiscoverOptions,
) -> Result<Vec<(String, PathBuf)>, DiscoveryError> {
    let read_dir =
        std::fs::read_dir(collection_dir).map_err(|e| DiscoveryError::io(collection_dir, e))?;

    let mut found = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| DiscoveryError::io(collection_dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || options.skip_directories.contains(&name) {
            continue;
        }
        if path.join(&options.publication_file).is_file() {
            found.push((name, path));
        }
    }

    found.sort();
    Ok(found)
}

fn parent(path: &Path) -> Result<&Path, DiscoveryError> {
    path.parent()
        .ok_or_else(|| DiscoveryError::malformed(path, "no parent directory"))
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
