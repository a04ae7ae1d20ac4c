//! # Host Kernels
//!
//! CPU versions of the four particle kernels. Each function processes the
//! first `params.particle_count` slots exactly as one dispatch of the WGSL
//! kernel would, with work-groups executed in index order.

use std::f32::consts::TAU;

use glam::Vec3;

use crate::compute::{KernelParams, SimParams};
use crate::particle::{slot_hash, HashStream, ParticleRecord};

/// `initParticleState`: every slot dead and zeroed.
pub fn init(records: &mut [ParticleRecord], params: &KernelParams) {
    let count = active_len(records, params);
    records[..count].fill(ParticleRecord::dead());
}

/// `spawnParticle`: revives at most `params.spawn_count` dead slots.
///
/// Every work-group counts its dead slots, reserves that many tickets from a
/// counter shared by the whole dispatch, and a dead slot spawns iff its
/// ticket is below the budget. Alive slots are never written.
///
/// Returns the number of particles spawned.
#[allow(clippy::cast_possible_truncation)]
pub fn spawn(
    records: &mut [ParticleRecord],
    params: &KernelParams,
    sim: &SimParams,
    group_size: u32,
) -> u32 {
    let budget = params.spawn_count;
    let count = active_len(records, params);
    let group_len = group_size.max(1) as usize;

    let mut claimed: u32 = 0;
    let mut spawned = 0;

    for (group_index, group) in records[..count].chunks_mut(group_len).enumerate() {
        if claimed >= budget {
            break;
        }
        let dead_in_group = group.iter().filter(|r| !r.is_alive()).count() as u32;
        let base = claimed;
        claimed = claimed.saturating_add(dead_in_group);

        let mut rank = 0;
        for (local, record) in group.iter_mut().enumerate() {
            if record.is_alive() {
                continue;
            }
            if base + rank < budget {
                let index = (group_index * group_len + local) as u32;
                *record = fresh_particle(index, params, sim);
                spawned += 1;
            }
            rank += 1;
        }
    }

    spawned
}

/// State of a particle born in slot `index` this frame.
#[must_use]
pub fn fresh_particle(index: u32, params: &KernelParams, sim: &SimParams) -> ParticleRecord {
    let hash = slot_hash(params.frame_seed(), index);
    let mut rng = HashStream::new(hash);

    let angle = rng.next_unit() * TAU;
    let radius = rng.next_unit().sqrt() * sim.emitter_radius;
    let position = Vec3::from(sim.emitter_position)
        + Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);

    let spread_x = rng.next_signed();
    let spread_y = rng.next_signed();
    let spread_z = rng.next_signed();
    let velocity = Vec3::from(sim.launch_velocity)
        + Vec3::new(spread_x, spread_y, spread_z) * sim.launch_spread;

    let t = rng.next_unit();
    let lifetime = sim.lifetime_min + (sim.lifetime_max - sim.lifetime_min) * t;

    ParticleRecord {
        position: position.into(),
        spawn_time: params.current_time,
        alive: 1,
        lifetime,
        velocity: velocity.into(),
        seed: hash,
        ..ParticleRecord::dead()
    }
}

/// `updateParticleState`: integrates live particles over `params.dt`.
///
/// With `dt == 0` positions and velocities are left unchanged.
#[allow(clippy::cast_possible_truncation)]
pub fn update(records: &mut [ParticleRecord], params: &KernelParams, sim: &SimParams) {
    let dt = params.dt;
    let gravity = Vec3::from(sim.gravity);
    let damping = (1.0 - sim.drag * dt).max(0.0);
    let count = active_len(records, params);

    for (index, record) in records[..count].iter_mut().enumerate() {
        if !record.is_alive() {
            continue;
        }
        let mut rng = HashStream::new(slot_hash(params.frame_seed(), index as u32));
        let jitter_x = rng.next_signed();
        let jitter_y = rng.next_signed();
        let jitter_z = rng.next_signed();
        let jitter = Vec3::new(jitter_x, jitter_y, jitter_z);

        let accel = gravity + jitter * sim.turbulence;
        let velocity = (Vec3::from(record.velocity) + accel * dt) * damping;
        record.velocity = velocity.into();
        record.position = (Vec3::from(record.position) + velocity * dt).into();
    }
}

/// `checkParticleDeath`: kills expired or escaped particles.
///
/// Returns the number of particles killed.
pub fn death_check(records: &mut [ParticleRecord], params: &KernelParams, sim: &SimParams) -> u32 {
    let emitter = Vec3::from(sim.emitter_position);
    let count = active_len(records, params);
    let mut killed = 0;

    for record in records[..count].iter_mut().filter(|r| r.is_alive()) {
        let position = Vec3::from(record.position);
        let expired = record.age(params.current_time) > record.lifetime;
        let escaped =
            position.y < sim.floor_height || position.distance(emitter) > sim.bounds_radius;
        if expired || escaped {
            record.alive = 0;
            killed += 1;
        }
    }

    killed
}

fn active_len(records: &[ParticleRecord], params: &KernelParams) -> usize {
    records.len().min(params.particle_count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{KernelArgs, KernelInvocation};
    use crate::config::SimulationConfig;

    fn sim() -> SimParams {
        SimParams::from_config(&SimulationConfig::default())
    }

    fn spawn_params(count: u32, capacity: u32, time: f32) -> KernelParams {
        KernelInvocation::new(
            KernelArgs::Spawn {
                count,
                seed: 17,
                current_time: time,
            },
            capacity,
        )
        .params()
    }

    #[test]
    fn test_spawn_respects_budget_and_never_touches_alive() {
        let mut records = vec![ParticleRecord::dead(); 1000];
        let sim = sim();

        let spawned = spawn(&mut records, &spawn_params(300, 1000, 0.0), &sim, 64);
        assert_eq!(spawned, 300);
        let alive_before: Vec<ParticleRecord> =
            records.iter().copied().filter(ParticleRecord::is_alive).collect();
        assert_eq!(alive_before.len(), 300);

        let spawned = spawn(&mut records, &spawn_params(300, 1000, 1.0), &sim, 64);
        assert_eq!(spawned, 300);
        // First generation untouched.
        let first_gen = records
            .iter()
            .filter(|r| r.is_alive() && r.spawn_time == 0.0)
            .count();
        assert_eq!(first_gen, 300);
    }

    #[test]
    fn test_spawn_saturates_at_dead_slots() {
        let mut records = vec![ParticleRecord::dead(); 100];
        let spawned = spawn(&mut records, &spawn_params(1000, 100, 0.0), &sim(), 32);
        assert_eq!(spawned, 100);
        let again = spawn(&mut records, &spawn_params(1000, 100, 0.0), &sim(), 32);
        assert_eq!(again, 0);
    }

    #[test]
    fn test_fresh_particle_within_emitter() {
        let sim = sim();
        for index in 0..500 {
            let p = fresh_particle(index, &spawn_params(1, 500, 2.5), &sim);
            assert!(p.is_alive());
            assert_eq!(p.spawn_time, 2.5);
            assert!(p.lifetime >= sim.lifetime_min && p.lifetime <= sim.lifetime_max);
            let offset = Vec3::from(p.position) - Vec3::from(sim.emitter_position);
            assert!(offset.length() <= sim.emitter_radius + 1e-4);
        }
    }

    #[test]
    fn test_update_with_zero_dt_is_identity() {
        let mut records = vec![ParticleRecord::dead(); 256];
        let sim = sim();
        spawn(&mut records, &spawn_params(128, 256, 0.0), &sim, 64);
        let before = records.clone();

        let params = KernelInvocation::new(KernelArgs::Update { seed: 5, dt: 0.0 }, 256).params();
        update(&mut records, &params, &sim);
        update(&mut records, &params, &sim);

        for (a, b) in before.iter().zip(&records) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.velocity, b.velocity);
        }
    }

    #[test]
    fn test_update_skips_dead_slots() {
        let mut records = vec![ParticleRecord::dead(); 4];
        records[1].position = [1.0, 2.0, 3.0];
        records[1].velocity = [5.0, 5.0, 5.0];
        let params = KernelInvocation::new(KernelArgs::Update { seed: 5, dt: 0.5 }, 4).params();
        update(&mut records, &params, &sim());
        assert_eq!(records[1].position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_death_by_age_floor_and_bounds() {
        let sim = sim();
        let alive = |position: [f32; 3], lifetime: f32| ParticleRecord {
            position,
            lifetime,
            alive: 1,
            ..ParticleRecord::dead()
        };
        let mut records = vec![
            alive([0.0, 1.0, 0.0], 10.0),
            alive([0.0, 1.0, 0.0], 0.5),
            alive([0.0, sim.floor_height - 1.0, 0.0], 10.0),
            alive([sim.bounds_radius + 1.0, 1.0, 0.0], 10.0),
        ];
        let params = KernelInvocation::new(KernelArgs::DeathCheck { current_time: 1.0 }, 4).params();
        let killed = death_check(&mut records, &params, &sim);
        assert_eq!(killed, 3);
        assert!(records[0].is_alive());
        assert!(records[1..].iter().all(|r| !r.is_alive()));
    }
}
