//! Optimistic writes for entities that carry `updated_at`.
//!
//! Every write stamps a new `updated_at`, so "`updated_at` still equals what
//! I read" means "nobody wrote since". Status transitions and content edits
//! use that as the store-side guard; this is what keeps a terminal state from
//! being left twice and `updated_at` strictly increasing.

use book_exchange_core::environment::{Clock, next_update_time, rfc3339_micros};
use book_exchange_core::query::{Filter, Update};
use book_exchange_core::repository::{CachedRepository, Entity};
use book_exchange_core::{DateTime, Error, ObjectId, Result, Utc};

/// Re-reads before giving up on a contended entity.
const MAX_ATTEMPTS: usize = 3;

/// An entity stamped on every write.
pub(crate) trait Versioned: Entity {
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Apply `update` to `current` unless the entity was written since it was read.
///
/// Stamps `updated_at`. Returns `Ok(None)` if the entity changed or vanished.
/// Cache keys derived from both the pre- and the post-image are invalidated.
pub(crate) async fn write_if_unchanged<T, F>(
    repo: &CachedRepository<T>,
    clock: &dyn Clock,
    current: &T,
    update: Update,
    invalidate: F,
) -> Result<Option<T>>
where
    T: Versioned,
    F: Fn(&T) -> Vec<String>,
{
    let previous = current.updated_at();
    let stamp = next_update_time(clock, previous);
    let guard = Filter::eq("updated_at", rfc3339_micros::format(&previous));
    let update = update.set("updated_at", rfc3339_micros::format(&stamp));

    let mut keys = invalidate(current);
    repo.modify_where(&current.id(), &guard, &update, |post| {
        keys.extend(invalidate(post));
        keys
    })
    .await
}

/// Read, check, write; retried a few times when another writer gets in between.
///
/// `check` sees the committed pre-image and rejects illegal writes (typically
/// with [`Error::Conflict`]). `build` derives the update from the pre-image.
pub(crate) async fn guarded_write<T, C, B, F>(
    repo: &CachedRepository<T>,
    clock: &dyn Clock,
    id: &ObjectId,
    check: C,
    build: B,
    invalidate: F,
) -> Result<T>
where
    T: Versioned,
    C: Fn(&T) -> Result<()>,
    B: Fn(&T) -> Update,
    F: Fn(&T) -> Vec<String>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let current = repo.get_uncached(id).await?;
        check(&current)?;
        if let Some(post) = write_if_unchanged(repo, clock, &current, build(&current), &invalidate).await? {
            return Ok(post);
        }
        tracing::debug!(family = T::FAMILY, id = %id, attempt, "Concurrent write, retrying");
    }
    Err(Error::Conflict(format!(
        "{} {id} is being modified concurrently",
        T::FAMILY
    )))
}

/// Write `update` only while the fields `guard` pins still match the committed
/// pre-image; retried a few times when another writer moves the entity first.
///
/// For entities without `updated_at` whose cache keys derive from a few
/// mutable fields: the pre-image keys handed to `invalidate` are then exactly
/// the lists the entity leaves.
pub(crate) async fn write_matching<T, G, F>(
    repo: &CachedRepository<T>,
    id: &ObjectId,
    guard: G,
    update: &Update,
    invalidate: F,
) -> Result<T>
where
    T: Entity,
    G: Fn(&T) -> Filter,
    F: Fn(&T) -> Vec<String>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        let current = repo.get_uncached(id).await?;
        let mut keys = invalidate(&current);
        let written = repo
            .modify_where(id, &guard(&current), update, |post| {
                keys.extend(invalidate(post));
                keys
            })
            .await?;
        if let Some(post) = written {
            return Ok(post);
        }
        tracing::debug!(family = T::FAMILY, id = %id, attempt, "Concurrent write, retrying");
    }
    Err(Error::Conflict(format!(
        "{} {id} is being modified concurrently",
        T::FAMILY
    )))
}
