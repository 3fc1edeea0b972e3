//! Team assembly - latency-aware ordering of a randomly picked team
//!
//! The order of a team is the relay order of the round. Every permutation of
//! the team is scored by the cost of the closed cycle through it (last node
//! back to the first) and the cheapest wins. Teams are single digits, so the
//! search is exhaustive; [`MAX_TEAM_SIZE`] caps it.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::{NodeId, NodeState, Region, RoundId};
use crate::error::{SchedulerError, SchedulerResult};

/// Largest team the exhaustive search accepts (10! orderings)
pub const MAX_TEAM_SIZE: usize = 10;

/// Relative cost of sending from the row region to the column region
///
/// Rows and columns follow [`Region::ALL`]. A few cells are deliberately
/// asymmetric.
const DEFAULT_LATENCY: [[u32; Region::COUNT]; Region::COUNT] = [
    //  Am  WE  CE  EE  ME  Af  Ru  As
    [1, 3, 4, 5, 8, 6, 10, 13],  // Americas
    [3, 1, 2, 3, 5, 4, 6, 10],   // WesternEurope
    [4, 2, 1, 2, 4, 5, 4, 9],    // CentralEurope
    [5, 3, 2, 1, 3, 6, 2, 8],    // EasternEurope
    [8, 5, 4, 3, 1, 4, 5, 6],    // MiddleEast
    [7, 4, 5, 6, 4, 1, 8, 12],   // Africa
    [10, 6, 4, 2, 5, 8, 1, 5],   // Russia
    [13, 11, 9, 8, 6, 12, 5, 1], // Asia
];

/// Pairwise region costs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyTable {
    costs: [[u32; Region::COUNT]; Region::COUNT],
}

impl LatencyTable {
    pub fn new(costs: [[u32; Region::COUNT]; Region::COUNT]) -> Self {
        Self { costs }
    }

    pub fn cost(&self, from: Region, to: Region) -> u32 {
        self.costs[from.index()][to.index()]
    }

    /// Cost of the closed cycle through `regions` in order
    pub fn cycle_cost(&self, regions: &[Region]) -> u32 {
        let len = regions.len();
        (0..len)
            .map(|i| self.cost(regions[i], regions[(i + 1) % len]))
            .sum()
    }
}

impl Default for LatencyTable {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY)
    }
}

/// Assembled but uncommitted round
#[derive(Debug, Clone)]
pub struct ProtoRound {
    pub id: RoundId,
    /// Node ids in relay order
    pub topology: Vec<NodeId>,
    /// Node handles in the same order as `topology`
    pub nodes: Vec<Arc<NodeState>>,
    pub batch_size: u32,
    pub precomputation_timeout: Duration,
    pub realtime_timeout: Duration,
}

/// Orders teams by latency; owns its latency table
#[derive(Debug, Clone, Default)]
pub struct TeamAssembler {
    latency: LatencyTable,
}

impl TeamAssembler {
    pub fn new(latency: LatencyTable) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> &LatencyTable {
        &self.latency
    }

    /// Reorder `nodes` into the cheapest cyclic relay order
    ///
    /// Fails on an empty or oversized team and on any unrecognized region tag.
    pub fn order_team(&self, nodes: Vec<Arc<NodeState>>) -> SchedulerResult<Vec<Arc<NodeState>>> {
        if nodes.is_empty() {
            return Err(SchedulerError::EmptyTeam);
        }
        if nodes.len() > MAX_TEAM_SIZE {
            return Err(SchedulerError::InvalidConfig(format!(
                "team of {} exceeds the exhaustive search limit of {MAX_TEAM_SIZE}",
                nodes.len()
            )));
        }

        let regions = nodes
            .iter()
            .map(|n| n.region_tag().parse::<Region>())
            .collect::<SchedulerResult<Vec<_>>>()?;

        let best = self.cheapest_order(&regions);
        debug!(team = nodes.len(), ?best, "TeamAssembler::order_team: ordered");

        let mut slots: Vec<Option<Arc<NodeState>>> = nodes.into_iter().map(Some).collect();
        Ok(best.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    /// Index order of the minimum-cost cycle through `regions`
    pub fn cheapest_order(&self, regions: &[Region]) -> Vec<usize> {
        let len = regions.len();
        let mut order: Vec<usize> = (0..len).collect();
        let mut best_order = order.clone();
        let mut best_cost = u32::MAX;

        permute(&mut order, 0, &mut |perm| {
            let mut total = 0u32;
            for i in 0..len {
                total += self.latency.cost(regions[perm[i]], regions[perm[(i + 1) % len]]);
                // ties keep the earlier order
                if total >= best_cost {
                    return;
                }
            }
            best_cost = total;
            best_order.copy_from_slice(perm);
        });

        best_order
    }

    /// Order `nodes` and bundle them with the round parameters
    pub fn create_proto_round(
        &self,
        id: RoundId,
        nodes: Vec<Arc<NodeState>>,
        batch_size: u32,
        precomputation_timeout: Duration,
        realtime_timeout: Duration,
    ) -> SchedulerResult<ProtoRound> {
        let nodes = self.order_team(nodes)?;
        let topology = nodes.iter().map(|n| n.id().clone()).collect();
        Ok(ProtoRound {
            id,
            topology,
            nodes,
            batch_size,
            precomputation_timeout,
            realtime_timeout,
        })
    }
}

/// Visit every permutation of `order[k..]` by swapping in place
fn permute<F: FnMut(&[usize])>(order: &mut [usize], k: usize, visit: &mut F) {
    if k + 1 >= order.len() {
        visit(order);
        return;
    }
    for i in k..order.len() {
        order.swap(k, i);
        permute(order, k + 1, visit);
        order.swap(k, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeStatus;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn node(id: &str, region: &str) -> Arc<NodeState> {
        Arc::new(NodeState::new(NodeId::new(id), region, NodeStatus::Active))
    }

    /// Minimum cycle cost by enumerating permutations in lexicographic order
    fn brute_force_min(table: &LatencyTable, regions: &[Region]) -> u32 {
        let mut perm: Vec<usize> = (0..regions.len()).collect();
        let mut best = u32::MAX;
        loop {
            let ordered: Vec<Region> = perm.iter().map(|&i| regions[i]).collect();
            best = best.min(table.cycle_cost(&ordered));

            let Some(i) = (1..perm.len()).rev().find(|&i| perm[i - 1] < perm[i]) else {
                return best;
            };
            let j = (i..perm.len()).rev().find(|&j| perm[j] > perm[i - 1]).unwrap();
            perm.swap(i - 1, j);
            perm[i..].reverse();
        }
    }

    #[test]
    fn test_default_table_shape() {
        let table = LatencyTable::default();
        for region in Region::ALL {
            assert_eq!(table.cost(region, region), 1);
        }
        assert_eq!(table.cost(Region::Americas, Region::Asia), 13);
        assert_ne!(
            table.cost(Region::Africa, Region::Americas),
            table.cost(Region::Americas, Region::Africa)
        );
    }

    #[test]
    fn test_permute_visits_all_orders() {
        let mut order: Vec<usize> = (0..4).collect();
        let mut seen = HashSet::new();
        permute(&mut order, 0, &mut |p| {
            seen.insert(p.to_vec());
        });
        assert_eq!(seen.len(), 24);
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_order_team_keeps_members() {
        let assembler = TeamAssembler::default();
        let team = vec![
            node("a", "Asia"),
            node("b", "Americas"),
            node("c", "Russia"),
            node("d", "WesternEurope"),
        ];
        let ordered = assembler.order_team(team).unwrap();
        let ids: HashSet<&str> = ordered.iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"].into_iter().collect());
    }

    #[test]
    fn test_order_team_is_cheapest() {
        let assembler = TeamAssembler::default();
        let tags = ["Asia", "Americas", "Russia", "WesternEurope", "Africa"];
        let team: Vec<_> = tags.iter().enumerate().map(|(i, t)| node(&format!("n{i}"), t)).collect();
        let ordered = assembler.order_team(team).unwrap();

        let regions: Vec<Region> = ordered.iter().map(|n| n.region_tag().parse().unwrap()).collect();
        let all: Vec<Region> = tags.iter().map(|t| t.parse().unwrap()).collect();
        assert_eq!(
            assembler.latency().cycle_cost(&regions),
            brute_force_min(assembler.latency(), &all)
        );
    }

    #[test]
    fn test_single_node_team() {
        let assembler = TeamAssembler::default();
        let ordered = assembler.order_team(vec![node("solo", "Africa")]).unwrap();
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn test_unknown_region_aborts() {
        let assembler = TeamAssembler::default();
        let err = assembler
            .order_team(vec![node("a", "Asia"), node("b", "Atlantis")])
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownRegion(tag) if tag == "Atlantis"));
    }

    #[test]
    fn test_empty_and_oversized_teams_rejected() {
        let assembler = TeamAssembler::default();
        assert!(matches!(assembler.order_team(vec![]), Err(SchedulerError::EmptyTeam)));

        let big: Vec<_> = (0..MAX_TEAM_SIZE + 1).map(|i| node(&format!("n{i}"), "Asia")).collect();
        assert!(matches!(assembler.order_team(big), Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_create_proto_round() {
        let assembler = TeamAssembler::default();
        let proto = assembler
            .create_proto_round(
                RoundId::new(9),
                vec![node("a", "Asia"), node("b", "Russia"), node("c", "Americas")],
                64,
                Duration::from_secs(60),
                Duration::from_secs(15),
            )
            .unwrap();
        assert_eq!(proto.id, RoundId::new(9));
        assert_eq!(proto.topology.len(), 3);
        let node_ids: Vec<NodeId> = proto.nodes.iter().map(|n| n.id().clone()).collect();
        assert_eq!(proto.topology, node_ids);
        assert_eq!(proto.batch_size, 64);
    }

    fn region_strategy() -> impl Strategy<Value = Region> {
        (0..Region::COUNT).prop_map(|i| Region::ALL[i])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_cheapest_order_matches_brute_force(regions in proptest::collection::vec(region_strategy(), 1..=8)) {
            let assembler = TeamAssembler::default();
            let order = assembler.cheapest_order(&regions);

            let mut sorted = order.clone();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, (0..regions.len()).collect::<Vec<_>>());

            let ordered: Vec<Region> = order.iter().map(|&i| regions[i]).collect();
            prop_assert_eq!(
                assembler.latency().cycle_cost(&ordered),
                brute_force_min(assembler.latency(), &regions)
            );
        }
    }
}
