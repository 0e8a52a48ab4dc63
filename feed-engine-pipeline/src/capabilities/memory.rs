use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use feed_engine_shared::types::{EntityRef, EntityType};
use uuid::Uuid;

use super::{EntityResolver, FollowerLookup, FollowerPage};
use crate::errors::CapabilityError;

/// Follower lookup over a fixed follower graph. Cursors are decimal offsets.
#[derive(Default)]
pub struct StaticFollowerLookup {
    followers: RwLock<HashMap<EntityRef, Vec<Uuid>>>,
}

impl StaticFollowerLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_follower(&self, target: EntityRef, follower_id: Uuid) {
        let mut followers = self.followers.write().unwrap_or_else(PoisonError::into_inner);
        let list = followers.entry(target).or_default();
        if !list.contains(&follower_id) {
            list.push(follower_id);
        }
    }

    pub fn remove_follower(&self, target: &EntityRef, follower_id: &Uuid) {
        let mut followers = self.followers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = followers.get_mut(target) {
            list.retain(|id| id != follower_id);
        }
    }
}

#[async_trait]
impl FollowerLookup for StaticFollowerLookup {
    async fn followers(
        &self,
        target: &EntityRef,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<FollowerPage, CapabilityError> {
        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| CapabilityError::decode(format!("bad cursor {cursor}")))?,
            None => 0,
        };
        let followers = self.followers.read().unwrap_or_else(PoisonError::into_inner);
        let all = followers.get(target).map(Vec::as_slice).unwrap_or_default();
        let end = (offset + limit.max(1)).min(all.len());
        let follower_ids = all.get(offset..end).unwrap_or_default().to_vec();
        let next_cursor = (end < all.len()).then(|| end.to_string());
        Ok(FollowerPage {
            follower_ids,
            next_cursor,
        })
    }
}

/// Entity resolver over a fixed set of display objects. Unknown ids resolve
/// to nothing, as a deleted entity would.
#[derive(Default)]
pub struct StaticEntityResolver {
    entities: RwLock<HashMap<(EntityType, Uuid), serde_json::Value>>,
}

impl StaticEntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: EntityRef, value: serde_json::Value) {
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((entity.entity_type, entity.id), value);
    }

    pub fn remove(&self, entity: &EntityRef) {
        self.entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(entity.entity_type, entity.id));
    }
}

#[async_trait]
impl EntityResolver for StaticEntityResolver {
    async fn resolve(
        &self,
        entity_type: EntityType,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, serde_json::Value>, CapabilityError> {
        let entities = self.entities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ids
            .iter()
            .filter_map(|id| {
                entities
                    .get(&(entity_type, *id))
                    .map(|value| (*id, value.clone()))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_follower_pages_walk_the_whole_set() {
        let lookup = StaticFollowerLookup::new();
        let target = EntityRef::user(Uuid::new_v4());
        let followers: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for follower in &followers {
            lookup.add_follower(target, *follower);
        }

        let first = lookup.followers(&target, None, 2).await.unwrap();
        assert_eq!(first.follower_ids, followers[..2].to_vec());
        let second = lookup
            .followers(&target, first.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.follower_ids, followers[2..4].to_vec());
        let last = lookup
            .followers(&target, second.next_cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(last.follower_ids, followers[4..].to_vec());
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_unknown_target_has_no_followers() {
        let lookup = StaticFollowerLookup::new();
        let page = lookup
            .followers(&EntityRef::game(Uuid::new_v4()), None, 10)
            .await
            .unwrap();
        assert!(page.follower_ids.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_resolver_skips_unknown_ids() {
        let resolver = StaticEntityResolver::new();
        let known = Uuid::new_v4();
        resolver.insert(EntityRef::game(known), serde_json::json!({"title": "Outer Wilds"}));

        let resolved = resolver
            .resolve(EntityType::Game, &[known, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&known]["title"], "Outer Wilds");
    }
}
