//! Specialized stores built on [`ResourceStore`](crate::ResourceStore).

mod accounts;
mod avatars;
mod developer_mode;
mod status;
mod user;
mod worlds;

pub use accounts::AccountsStore;
pub use avatars::AvatarsStore;
pub use developer_mode::DeveloperModeStore;
pub use status::{status_alert_variant, StatusStore};
pub use user::UserStore;
pub use worlds::WorldsStore;

use circle_core::{LimitedAvatar, LimitedUserFriend, LimitedWorld, StoredAccount};

/// Entities addressed by a string id inside cached lists.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for LimitedUserFriend {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for LimitedWorld {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for LimitedAvatar {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for StoredAccount {
    fn id(&self) -> &str {
        self.user_id.as_str()
    }
}

/// Replace the item with the same id in place, or insert it at the front.
///
/// Listings are ordered most recently updated first, so a new item leads.
pub(crate) fn upsert_by_id<E: Identified>(items: &mut Vec<E>, item: E) {
    match items.iter().position(|existing| existing.id() == item.id()) {
        Some(index) => items[index] = item,
        None => items.insert(0, item),
    }
}

/// Remove the item with `id`. Returns whether anything was removed.
pub(crate) fn remove_by_id<E: Identified>(items: &mut Vec<E>, id: &str) -> bool {
    let before = items.len();
    items.retain(|existing| existing.id() != id);
    items.len() != before
}

/// Apply `edit` to the item with `id`. Returns whether it was found.
pub(crate) fn edit_by_id<E, F>(items: &mut [E], id: &str, edit: F) -> bool
where
    E: Identified,
    F: FnOnce(&mut E),
{
    match items.iter_mut().find(|existing| existing.id() == id) {
        Some(item) => {
            edit(item);
            true
        }
        None => false,
    }
}
