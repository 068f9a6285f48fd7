//! Constraint-based causal discovery (PC algorithm).
//!
//! Conditional independence is tested with Fisher z on partial
//! correlations over complete-case rows. The skeleton search removes edges
//! whose endpoints are independent given some subset of a neighbour set;
//! unshielded colliders are then oriented, followed by Meek's first rule.
//! Edges left unoriented, or oriented both ways by conflicting colliders,
//! stay undirected.

use std::collections::{HashMap, HashSet};

use nalgebra::DMatrix;
use petgraph::graph::{NodeIndex, UnGraph};
use tracing::debug;

use crate::estimators::stats::{fisher_z_p_value, mean};
use crate::estimators::DiscoveryParams;
use crate::model::{CausalGraph, EdgeKind, GraphEdge, JoinedObservation, Variable};
use crate::{Result, SeedfireError};

const METHOD: &str = "causal_discovery";

fn correlation_matrix(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let p = columns.len();
    let centered: Vec<Vec<f64>> = columns
        .iter()
        .map(|c| {
            let m = mean(c);
            c.iter().map(|v| v - m).collect()
        })
        .collect();
    let norms: Vec<f64> = centered
        .iter()
        .map(|c| c.iter().map(|v| v * v).sum::<f64>().sqrt())
        .collect();

    DMatrix::from_fn(p, p, |i, j| {
        if i == j {
            return 1.0;
        }
        let dot: f64 = centered[i].iter().zip(&centered[j]).map(|(a, b)| a * b).sum();
        dot / (norms[i] * norms[j])
    })
}

/// Partial correlation of `i` and `j` given `cond`, read off the inverse of
/// the correlation submatrix.
fn partial_correlation(corr: &DMatrix<f64>, i: usize, j: usize, cond: &[usize]) -> f64 {
    if cond.is_empty() {
        return corr[(i, j)];
    }
    let idx: Vec<usize> = [i, j].iter().chain(cond.iter()).copied().collect();
    let k = idx.len();
    let sub = DMatrix::from_fn(k, k, |a, b| corr[(idx[a], idx[b])]);
    let precision = match sub.clone().try_inverse() {
        Some(inv) => inv,
        None => match sub.pseudo_inverse(1e-12) {
            Ok(pinv) => pinv,
            Err(_) => return 0.0,
        },
    };
    let denom = (precision[(0, 0)] * precision[(1, 1)]).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return 0.0;
    }
    -precision[(0, 1)] / denom
}

fn combinations(items: &[usize], size: usize) -> Vec<Vec<usize>> {
    if size == 0 {
        return vec![Vec::new()];
    }
    if items.len() < size {
        return Vec::new();
    }
    let mut out = Vec::new();
    for (pos, &first) in items.iter().enumerate() {
        for mut rest in combinations(&items[pos + 1..], size - 1) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

fn neighbours(graph: &UnGraph<Variable, ()>, node: usize, exclude: usize) -> Vec<usize> {
    let mut n: Vec<usize> = graph
        .neighbors(NodeIndex::new(node))
        .map(|n| n.index())
        .filter(|&n| n != exclude)
        .collect();
    n.sort_unstable();
    n
}

fn adjacent(graph: &UnGraph<Variable, ()>, a: usize, b: usize) -> bool {
    graph
        .find_edge(NodeIndex::new(a), NodeIndex::new(b))
        .is_some()
}

pub fn discover(table: &[JoinedObservation], params: &DiscoveryParams) -> Result<CausalGraph> {
    let mut variables = params.variables.clone();
    variables.sort();
    variables.dedup();
    if variables.len() < 2 {
        return Err(SeedfireError::InvalidConfig(
            "causal discovery needs at least two variables".to_string(),
        ));
    }
    if !(params.alpha > 0.0 && params.alpha < 1.0) {
        return Err(SeedfireError::InvalidConfig(
            "discovery alpha must be in (0, 1)".to_string(),
        ));
    }

    let rows: Vec<Vec<f64>> = table
        .iter()
        .filter_map(|obs| {
            variables
                .iter()
                .map(|v| v.value(obs))
                .collect::<Option<Vec<f64>>>()
        })
        .collect();
    let n = rows.len();
    let p = variables.len();
    let needed = p + 3;
    if n < needed {
        return Err(SeedfireError::InsufficientObservations {
            method: METHOD,
            needed,
            got: n,
        });
    }

    let columns: Vec<Vec<f64>> = (0..p).map(|j| rows.iter().map(|r| r[j]).collect()).collect();
    for (j, column) in columns.iter().enumerate() {
        let first = column[0];
        if column.iter().all(|v| (v - first).abs() <= f64::EPSILON * first.abs().max(1.0)) {
            return Err(SeedfireError::DegenerateVariable {
                method: METHOD,
                variable: variables[j],
            });
        }
    }
    let corr = correlation_matrix(&columns);

    let mut graph: UnGraph<Variable, ()> = UnGraph::new_undirected();
    for v in &variables {
        graph.add_node(*v);
    }
    for a in 0..p {
        for b in (a + 1)..p {
            graph.add_edge(NodeIndex::new(a), NodeIndex::new(b), ());
        }
    }

    // Skeleton.
    let mut sepsets: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
    let max_level = params.max_condition_size.min(p.saturating_sub(2));
    for level in 0..=max_level {
        for a in 0..p {
            for b in (a + 1)..p {
                if !adjacent(&graph, a, b) {
                    continue;
                }
                let candidates = [neighbours(&graph, a, b), neighbours(&graph, b, a)];
                let mut separated = None;
                'search: for pool in &candidates {
                    for cond in combinations(pool, level) {
                        let r = partial_correlation(&corr, a, b, &cond);
                        let p_value = fisher_z_p_value(r, n, cond.len());
                        if p_value > params.alpha {
                            separated = Some(cond);
                            break 'search;
                        }
                    }
                }
                if let Some(cond) = separated {
                    if let Some(edge) = graph.find_edge(NodeIndex::new(a), NodeIndex::new(b)) {
                        graph.remove_edge(edge);
                    }
                    debug!(
                        a = %variables[a],
                        b = %variables[b],
                        given = cond.len(),
                        "removed edge"
                    );
                    sepsets.insert((a, b), cond);
                }
            }
        }
    }

    // Colliders: a -> c <- b for non-adjacent a, b with c outside sepset(a, b).
    let mut arrows: HashSet<(usize, usize)> = HashSet::new();
    for a in 0..p {
        for b in (a + 1)..p {
            if adjacent(&graph, a, b) {
                continue;
            }
            let sepset = sepsets.get(&(a, b)).cloned().unwrap_or_default();
            for c in 0..p {
                if c == a || c == b {
                    continue;
                }
                if adjacent(&graph, a, c) && adjacent(&graph, b, c) && !sepset.contains(&c) {
                    arrows.insert((a, c));
                    arrows.insert((b, c));
                }
            }
        }
    }

    // Meek rule 1: a -> b - c with a, c non-adjacent gives b -> c.
    let oriented = |arrows: &HashSet<(usize, usize)>, x: usize, y: usize| {
        arrows.contains(&(x, y)) || arrows.contains(&(y, x))
    };
    loop {
        let mut added = Vec::new();
        for &(a, b) in &arrows {
            if arrows.contains(&(b, a)) {
                continue;
            }
            for c in neighbours(&graph, b, a) {
                if !adjacent(&graph, a, c) && !oriented(&arrows, b, c) {
                    added.push((b, c));
                }
            }
        }
        if added.is_empty() {
            break;
        }
        arrows.extend(added);
    }

    let mut edges = Vec::new();
    for a in 0..p {
        for b in (a + 1)..p {
            if !adjacent(&graph, a, b) {
                continue;
            }
            let forward = arrows.contains(&(a, b));
            let backward = arrows.contains(&(b, a));
            let (from, to, kind) = match (forward, backward) {
                (true, false) => (a, b, EdgeKind::Directed),
                (false, true) => (b, a, EdgeKind::Directed),
                _ => (a, b, EdgeKind::Undirected),
            };
            edges.push(GraphEdge {
                from: variables[from],
                to: variables[to],
                kind,
                strength: corr[(a, b)].abs(),
            });
        }
    }

    Ok(CausalGraph {
        variables,
        edges,
        n_observations: n,
        alpha: params.alpha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Region;
    use crate::window::TimeWindow;

    /// Full factorial over three independent factors: precipitation and
    /// acreage are both causes of the fire count, and independent of each
    /// other.
    fn collider_table() -> Vec<JoinedObservation> {
        let mut table = Vec::new();
        let levels = [-2i64, -1, 0, 1, 2];
        let mut idx = 0;
        for a in levels {
            for b in levels {
                for c in levels {
                    let mut o = JoinedObservation::empty(
                        Region::new(format!("R{idx}")),
                        TimeWindow::annual(2000),
                    );
                    o.precipitation_mm = Some(50.0 + 5.0 * a as f64);
                    o.acres_burned = Some(100.0 + 5.0 * b as f64);
                    o.fire_count = Some((20 + 2 * a + 2 * b + c) as u64);
                    table.push(o);
                    idx += 1;
                }
            }
        }
        table
    }

    fn params() -> DiscoveryParams {
        DiscoveryParams {
            variables: vec![
                Variable::PrecipitationMm,
                Variable::WildfireCount,
                Variable::AcresBurned,
            ],
            alpha: 0.01,
            max_condition_size: 1,
        }
    }

    #[test]
    fn recovers_collider() {
        let graph = discover(&collider_table(), &params()).unwrap();
        assert_eq!(graph.n_observations, 125);
        assert!(!graph.adjacent(Variable::PrecipitationMm, Variable::AcresBurned));
        assert!(graph.directed(Variable::PrecipitationMm, Variable::WildfireCount));
        assert!(graph.directed(Variable::AcresBurned, Variable::WildfireCount));
    }

    #[test]
    fn incomplete_rows_are_dropped_and_counted() {
        let mut table = collider_table();
        table.truncate(5);
        table[0].acres_burned = None;
        assert!(matches!(
            discover(&table, &params()),
            Err(SeedfireError::InsufficientObservations { needed: 6, got: 4, .. })
        ));
    }

    #[test]
    fn constant_variable_is_degenerate() {
        let mut table = collider_table();
        for o in &mut table {
            o.acres_burned = Some(1.0);
        }
        assert!(matches!(
            discover(&table, &params()),
            Err(SeedfireError::DegenerateVariable {
                variable: Variable::AcresBurned,
                ..
            })
        ));
    }

    #[test]
    fn partial_correlation_removes_common_cause() {
        // x -> y, x -> z: y and z correlate marginally but not given x.
        let corr = DMatrix::from_row_slice(3, 3, &[1.0, 0.8, 0.6, 0.8, 1.0, 0.48, 0.6, 0.48, 1.0]);
        assert!((partial_correlation(&corr, 1, 2, &[]) - 0.48).abs() < 1e-12);
        assert!(partial_correlation(&corr, 1, 2, &[0]).abs() < 1e-9);
    }

    #[test]
    fn combinations_enumerate_subsets() {
        assert_eq!(combinations(&[1, 2, 3], 2), vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
        assert_eq!(combinations(&[1], 0), vec![Vec::<usize>::new()]);
        assert!(combinations(&[1], 2).is_empty());
    }
}
