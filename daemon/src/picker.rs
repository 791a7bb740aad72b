use common::PaperError;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::catalog::image_name;

/// Names of images already shown, in the order they were shown
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    order: Vec<String>,
    lookup: HashSet<String>,
}

impl SeenSet {
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut set = Self::default();
        for name in names {
            set.insert(name);
        }
        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    /// Returns false if the name was already present
    pub fn insert(&mut self, name: String) -> bool {
        if self.lookup.insert(name.clone()) {
            self.order.push(name);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.lookup.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names oldest first, as persisted
    pub fn names(&self) -> &[String] {
        &self.order
    }
}

/// Images chosen for one rotation
#[derive(Debug, Clone)]
pub struct Selection {
    /// One image per monitor, monitor 0 first
    pub images: Vec<PathBuf>,

    /// The seen set was emptied before choosing
    pub reset: bool,
}

/// Choose `count` distinct images that are not in `seen`.
///
/// When `seen.len() + count` exceeds the catalog, the seen set is emptied
/// first, even if a few unseen images remain. The chosen names are added to
/// `seen`; persisting it is up to the caller.
pub fn pick<R: Rng + ?Sized>(
    catalog: &[PathBuf],
    seen: &mut SeenSet,
    count: usize,
    rng: &mut R,
) -> Result<Selection, PaperError> {
    if count == 0 || catalog.len() < count {
        return Err(PaperError::InsufficientImages {
            found: catalog.len(),
            needed: count.max(1),
        });
    }

    let reset = seen.len() + count > catalog.len();
    if reset {
        log::info!(
            "Seen set exhausted ({} seen + {} needed > {} images), starting over",
            seen.len(),
            count,
            catalog.len()
        );
        seen.clear();
    }

    let mut unseen: Vec<&PathBuf> = catalog
        .iter()
        .filter(|path| !seen.contains(&image_name(path)))
        .collect();
    unseen.shuffle(rng);

    // At least catalog.len() - seen.len() >= count entries are unseen here
    let images: Vec<PathBuf> = unseen.into_iter().take(count).cloned().collect();

    for image in &images {
        seen.insert(image_name(image));
    }

    log::debug!(
        "Picked {:?} ({} seen)",
        images.iter().map(|p| image_name(p)).collect::<Vec<_>>(),
        seen.len()
    );

    Ok(Selection { images, reset })
}
