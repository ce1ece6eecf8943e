//! Random disturbance between tabu runs: a burst of ADD, MOV and DEL
//! operations that keeps the matrix LP-feasible and only stops on a state
//! the tabu memory has not seen.

use super::SearchContext;
use crate::state::VisitMatrix;
use crate::tabu::TabuMemory;
use crate::utils::{sample, Timer};
use rand::rngs::StdRng;
use rand::Rng;

/// Shake `visits` with 2-3 ADDs, 4-6 MOVs and 1-2 DELs. MOV and DEL are
/// validated by the quantity LP and rolled back when infeasible; ADD only
/// relaxes the LP and needs no probe. Repeats until the state is not tabu
/// or the deadline fires.
pub fn shake(
    ctx: &SearchContext,
    visits: &mut VisitMatrix,
    tabu: &TabuMemory,
    rng: &mut StdRng,
    timer: &Timer,
) {
    let add_target = 2 + rng.gen_range(0..2);
    let del_target = 1 + rng.gen_range(0..2);
    let mov_target = 4 + rng.gen_range(0..3);

    let period_num = visits.period_num();
    let node_num = visits.node_num();
    let depot_num = ctx.problem.depot_num;
    let cell = |p: usize, n: usize| p * node_num + n;

    loop {
        // ADD: raise a sample of vacant cells
        let mut room: Vec<usize> = Vec::new();
        for p in 0..period_num {
            for n in depot_num..node_num {
                if !visits.get(p, n) {
                    room.push(cell(p, n));
                }
            }
        }
        for vid in sample(&room, add_target, rng) {
            visits.set(vid / node_num, vid % node_num, true);
        }

        // MOV: shift visits between periods, keeping the LP feasible
        let mut mov_room: Vec<(usize, usize)> = Vec::new();
        for n in depot_num..node_num {
            for p1 in 0..period_num {
                for p2 in p1 + 1..period_num {
                    match (visits.get(p1, n), visits.get(p2, n)) {
                        (true, false) => mov_room.push((cell(p2, n), cell(p1, n))),
                        (false, true) => mov_room.push((cell(p1, n), cell(p2, n))),
                        _ => {}
                    }
                }
            }
        }
        let mut raised: Vec<usize> = Vec::new();
        let mut cleared: Vec<usize> = Vec::new();
        let mut moved = 0;
        while moved < mov_target && !mov_room.is_empty() {
            let pos = rng.gen_range(0..mov_room.len());
            let (to, from) = mov_room.swap_remove(pos);
            if raised.contains(&to) || cleared.contains(&from) {
                continue;
            }
            visits.set(to / node_num, to % node_num, true);
            visits.set(from / node_num, from % node_num, false);
            if ctx.lp.objective(visits).is_none() {
                visits.set(to / node_num, to % node_num, false);
                visits.set(from / node_num, from % node_num, true);
            } else {
                moved += 1;
                raised.push(to);
                cleared.push(from);
            }
        }

        // DEL: drop visits, keeping the LP feasible
        let mut room: Vec<usize> = Vec::new();
        for p in 0..period_num {
            for n in depot_num..node_num {
                if visits.get(p, n) {
                    room.push(cell(p, n));
                }
            }
        }
        let mut deleted = 0;
        while deleted < del_target && !room.is_empty() {
            let pos = rng.gen_range(0..room.len());
            let vid = room.swap_remove(pos);
            visits.set(vid / node_num, vid % node_num, false);
            if ctx.lp.objective(visits).is_none() {
                visits.set(vid / node_num, vid % node_num, true);
            } else {
                deleted += 1;
            }
        }

        if timer.is_time_out() || !tabu.is_tabu_state(visits) {
            return;
        }
    }
}
