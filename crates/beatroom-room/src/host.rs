//! Host migration.

use beatroom_protocol::PlayerId;
use rand::Rng;

use crate::Room;

/// Picks a new host uniformly at random.
///
/// Non-spectators are preferred; if everyone left is spectating, any
/// member may be picked. The outcome depends only on the roster order and
/// the state of `rng`, so a seeded generator gives a repeatable pick.
pub fn pick_host<R: Rng + ?Sized>(room: &Room, rng: &mut R) -> Option<PlayerId> {
    let mut pool: Vec<PlayerId> = room.active_players().map(|p| p.id).collect();
    if pool.is_empty() {
        pool = room.players.iter().map(|p| p.id).collect();
    }
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.random_range(0..pool.len())])
}

/// Replaces a host who is no longer a member. Returns `(old, new)`.
pub(crate) fn migrate<R: Rng + ?Sized>(room: &mut Room, rng: &mut R) -> Option<(PlayerId, PlayerId)> {
    if room.contains(room.host) {
        return None;
    }
    let next = pick_host(room, rng)?;
    let previous = std::mem::replace(&mut room.host, next);
    tracing::info!(room_id = %room.id, from = %previous, to = %next, "host migrated");
    Some((previous, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewRoom, Player, RoomSettings};
    use beatroom_protocol::{ChannelId, RoomId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn room(ids: &[u64]) -> Room {
        let mut room = Room::open(
            RoomId::new("HOSTS2"),
            NewRoom {
                name: "r".into(),
                password: None,
                channel: ChannelId(1),
                host: Player::new(PlayerId(ids[0]), "host"),
                settings: RoomSettings::default(),
            },
        );
        for &id in &ids[1..] {
            room.players.push(Player::new(PlayerId(id), "p"));
        }
        room
    }

    #[test]
    fn test_pick_host_prefers_non_spectators() {
        let mut r = room(&[1, 2, 3]);
        r.players[1].is_spectating = true;
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..20 {
            let pick = pick_host(&r, &mut rng).unwrap();
            assert_ne!(pick, PlayerId(2));
        }
    }

    #[test]
    fn test_pick_host_falls_back_to_spectators() {
        let mut r = room(&[1, 2]);
        r.players.iter_mut().for_each(|p| p.is_spectating = true);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(pick_host(&r, &mut rng).is_some());
    }

    #[test]
    fn test_same_seed_same_pick() {
        let r = room(&[1, 2, 3, 4, 5]);
        let a = pick_host(&r, &mut StdRng::seed_from_u64(42));
        let b = pick_host(&r, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_migrate_only_when_host_gone() {
        let mut r = room(&[1, 2, 3]);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(migrate(&mut r, &mut rng), None);

        r.players.remove(0);
        let (from, to) = migrate(&mut r, &mut rng).unwrap();
        assert_eq!(from, PlayerId(1));
        assert!(to == PlayerId(2) || to == PlayerId(3));
        assert_eq!(r.host, to);
    }
}
