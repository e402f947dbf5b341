//! Period clustering for time-series aggregation.
//!
//! Both methods work on a list of period vectors (one vector per candidate
//! period, concatenating the hours of every series) and return which cluster
//! each period belongs to. Initialization is k-means++ style with a seeded
//! RNG so runs are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Result of clustering `periods.len()` periods into `k` groups
#[derive(Debug, Clone)]
pub struct ClusterResult {
    /// Cluster id per period
    pub assignment: Vec<usize>,
    /// Number of periods per cluster
    pub occurrences: Vec<usize>,
    /// Medoid period index per cluster (k-medoids only)
    pub medoids: Option<Vec<usize>>,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// k-means++ style seeding: first center uniform, then proportional to the
/// squared distance to the nearest chosen center.
fn seed_centers(periods: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centers: Vec<Vec<f64>> = Vec::with_capacity(k);
    centers.push(periods[rng.gen_range(0..periods.len())].clone());
    while centers.len() < k {
        let distances: Vec<f64> = periods
            .iter()
            .map(|p| {
                centers
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();
        if total <= 0.0 {
            // all remaining periods coincide with a center
            centers.push(periods[rng.gen_range(0..periods.len())].clone());
            continue;
        }
        let mut draw = rng.gen::<f64>() * total;
        let mut chosen = periods.len() - 1;
        for (i, d) in distances.iter().enumerate() {
            draw -= d;
            if draw <= 0.0 {
                chosen = i;
                break;
            }
        }
        centers.push(periods[chosen].clone());
    }
    centers
}

fn assign(periods: &[Vec<f64>], centers: &[Vec<f64>]) -> Vec<usize> {
    periods
        .iter()
        .map(|p| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, center) in centers.iter().enumerate() {
                let dist = squared_distance(p, center);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            best
        })
        .collect()
}

fn occurrences(assignment: &[usize], k: usize) -> Vec<usize> {
    let mut counts = vec![0; k];
    for &c in assignment {
        counts[c] += 1;
    }
    counts
}

/// Lloyd's algorithm over the period vectors.
pub fn k_means(periods: &[Vec<f64>], k: usize, seed: u64, max_iterations: usize) -> ClusterResult {
    assert!(k >= 1 && k <= periods.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let dim = periods[0].len();
    let mut centers = seed_centers(periods, k, &mut rng);
    let mut assignment = assign(periods, &centers);

    for _ in 0..max_iterations {
        // recompute centroids
        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &c) in periods.iter().zip(assignment.iter()) {
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(p.iter()) {
                *s += v;
            }
        }
        for (c, count) in counts.iter().enumerate() {
            if *count == 0 {
                // re-seed an empty cluster with the period farthest from
                // its currently assigned center
                let farthest = periods
                    .iter()
                    .enumerate()
                    .max_by(|(ia, a), (ib, b)| {
                        let da = squared_distance(a, &centers[assignment[*ia]]);
                        let db = squared_distance(b, &centers[assignment[*ib]]);
                        da.partial_cmp(&db).unwrap()
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                centers[c] = periods[farthest].clone();
            } else {
                for (dst, s) in centers[c].iter_mut().zip(sums[c].iter()) {
                    *dst = s / *count as f64;
                }
            }
        }

        let next = assign(periods, &centers);
        if next == assignment {
            break;
        }
        assignment = next;
    }

    let occ = occurrences(&assignment, k);
    ClusterResult {
        assignment,
        occurrences: occ,
        medoids: None,
    }
}

/// PAM-style k-medoids: alternate assignment to the nearest medoid with a
/// per-cluster medoid update until stable.
pub fn k_medoids(periods: &[Vec<f64>], k: usize, seed: u64, max_iterations: usize) -> ClusterResult {
    assert!(k >= 1 && k <= periods.len());
    let mut rng = StdRng::seed_from_u64(seed);

    // choose initial medoids among the actual periods
    let centers = seed_centers(periods, k, &mut rng);
    let mut medoids: Vec<usize> = centers
        .iter()
        .map(|c| {
            periods
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    squared_distance(a, c)
                        .partial_cmp(&squared_distance(b, c))
                        .unwrap()
                })
                .map(|(i, _)| i)
                .unwrap()
        })
        .collect();

    let mut assignment = vec![0usize; periods.len()];
    for _ in 0..max_iterations {
        // assign to nearest medoid
        for (i, p) in periods.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, &m) in medoids.iter().enumerate() {
                let dist = squared_distance(p, &periods[m]);
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            assignment[i] = best;
        }

        // update each medoid to the member minimizing intra-cluster cost
        let mut changed = false;
        for c in 0..k {
            let members: Vec<usize> = (0..periods.len()).filter(|&i| assignment[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            let best = *members
                .iter()
                .min_by(|&&a, &&b| {
                    let cost_a: f64 = members
                        .iter()
                        .map(|&m| squared_distance(&periods[a], &periods[m]))
                        .sum();
                    let cost_b: f64 = members
                        .iter()
                        .map(|&m| squared_distance(&periods[b], &periods[m]))
                        .sum();
                    cost_a.partial_cmp(&cost_b).unwrap()
                })
                .unwrap();
            if medoids[c] != best {
                medoids[c] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let occ = occurrences(&assignment, k);
    ClusterResult {
        assignment,
        occurrences: occ,
        medoids: Some(medoids),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two obvious groups of periods around 0 and around 10
    fn bimodal_periods() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.1],
            vec![0.2, 0.0],
            vec![0.1, 0.1],
            vec![10.0, 10.1],
            vec![9.9, 10.0],
            vec![10.1, 9.8],
        ]
    }

    #[test]
    fn test_k_means_separates_groups() {
        let periods = bimodal_periods();
        let result = k_means(&periods, 2, 42, 100);
        assert_eq!(result.assignment[0], result.assignment[1]);
        assert_eq!(result.assignment[0], result.assignment[2]);
        assert_eq!(result.assignment[3], result.assignment[4]);
        assert_ne!(result.assignment[0], result.assignment[3]);
        assert_eq!(result.occurrences.iter().sum::<usize>(), 6);
    }

    #[test]
    fn test_k_medoids_picks_member_representatives() {
        let periods = bimodal_periods();
        let result = k_medoids(&periods, 2, 42, 100);
        let medoids = result.medoids.unwrap();
        assert_eq!(medoids.len(), 2);
        // medoids are actual period indices from different groups
        let groups: Vec<bool> = medoids.iter().map(|&m| periods[m][0] > 5.0).collect();
        assert_ne!(groups[0], groups[1]);
    }

    #[test]
    fn test_single_cluster() {
        let periods = bimodal_periods();
        let result = k_means(&periods, 1, 7, 50);
        assert!(result.assignment.iter().all(|&c| c == 0));
        assert_eq!(result.occurrences, vec![6]);
    }

    #[test]
    fn test_reproducible_with_same_seed() {
        let periods = bimodal_periods();
        let a = k_means(&periods, 2, 13, 100);
        let b = k_means(&periods, 2, 13, 100);
        assert_eq!(a.assignment, b.assignment);
    }
}
