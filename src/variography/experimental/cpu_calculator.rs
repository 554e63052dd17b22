use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::error::{GeostatError, Result};
use crate::geometry::{lag_direction, Anisotropy, DirectionTolerance};
use crate::spatial_database::SpatialPointSet;

use super::{
    BinEdges, CloudPoint, EmpiricalVariogramPoint, ExperimentalVariogram, LagBin,
    VariogramConfig, DEFAULT_CUTOFF_FRACTION, DEFAULT_LAG_COUNT, MAX_LAG_BINS,
};

//rows of the pair triangle handled by one rayon task
const ROW_CHUNK: usize = 32;

#[derive(Clone, Copy, Default)]
struct BinAccumulator {
    count: usize,
    distance: f64,
    semivariance: f64,
}

impl BinAccumulator {
    #[inline(always)]
    fn push(&mut self, distance: f64, semivariance: f64) {
        self.count += 1;
        self.distance += distance;
        self.semivariance += semivariance;
    }

    #[inline(always)]
    fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.distance += other.distance;
        self.semivariance += other.semivariance;
    }
}

/// All-pairs variogram calculator with resolved lag settings.
#[derive(Clone)]
pub struct CPUCalculator<'a> {
    //data
    data: &'a SpatialPointSet,

    //lag bins, shared by every direction
    lags: Vec<LagBin>,
    cutoff: f64,
    width: f64,

    //tolerance
    directions: Vec<DirectionTolerance>,
    anisotropy: Option<Anisotropy>,
}

impl<'a> CPUCalculator<'a> {
    pub fn new(data: &'a SpatialPointSet, config: &VariogramConfig) -> Result<Self> {
        config.validate()?;
        if data.len() < 2 {
            return Err(GeostatError::insufficient("variogram estimation", 2, data.len()));
        }

        let cutoff = match config.cutoff {
            Some(cutoff) => cutoff,
            None => {
                let cutoff = max_lag(data, config.anisotropy.as_ref()) * DEFAULT_CUTOFF_FRACTION;
                if cutoff <= 0.0 {
                    return Err(GeostatError::invalid(
                        "cutoff",
                        cutoff,
                        "derived from a set whose samples are all collocated",
                    ));
                }
                cutoff
            }
        };
        let width = config
            .width
            .unwrap_or(cutoff / DEFAULT_LAG_COUNT as f64);
        let n_bins = cutoff / width;
        if !(n_bins.is_finite() && n_bins <= MAX_LAG_BINS as f64) {
            return Err(GeostatError::invalid(
                "width",
                width,
                format!("cutoff {} would need more than {} lag bins", cutoff, MAX_LAG_BINS),
            ));
        }

        Ok(Self {
            data,
            lags: lag_bins(cutoff, width, config.bin_edges),
            cutoff,
            width,
            directions: config.directions.clone(),
            anisotropy: config.anisotropy,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn lags(&self) -> &[LagBin] {
        &self.lags
    }

    #[inline(always)]
    fn lag_distance(&self, h: &Vector2<f64>) -> f64 {
        match &self.anisotropy {
            Some(anisotropy) => anisotropy.transform(h).norm(),
            None => h.norm(),
        }
    }

    /// Index of the lag bin containing `d`, or None beyond the cutoff.
    #[inline(always)]
    fn bin_index(&self, d: f64) -> Option<usize> {
        if !(0.0..=self.cutoff).contains(&d) {
            return None;
        }
        let last = self.lags.len() - 1;
        let guess = ((d / self.width).floor() as usize).min(last);
        //arithmetic guess can be off by one at the edges
        (guess.saturating_sub(1)..=(guess + 1).min(last)).find(|&k| self.lags[k].contains_distance(d))
    }

    /// Binned empirical variogram.
    pub fn calculate(&self) -> Result<ExperimentalVariogram> {
        let n = self.data.len();
        let n_dirs = self.directions.len().max(1);
        let n_lags = self.lags.len();
        let points = self.data.points();
        let values = self.data.values();

        let partials = (0..(n + ROW_CHUNK - 1) / ROW_CHUNK)
            .into_par_iter()
            .map(|chunk| {
                let mut acc = vec![BinAccumulator::default(); n_dirs * n_lags];
                for i in chunk * ROW_CHUNK..((chunk + 1) * ROW_CHUNK).min(n) {
                    for j in i + 1..n {
                        let h = points[j] - points[i];
                        let d = self.lag_distance(&h);
                        let Some(lag) = self.bin_index(d) else {
                            continue;
                        };
                        let semivariance = 0.5 * (values[i] - values[j]).powi(2);

                        if self.directions.is_empty() {
                            acc[lag].push(d, semivariance);
                            continue;
                        }
                        for (dir, tolerance) in self.directions.iter().enumerate() {
                            if tolerance.contains(&h) {
                                acc[dir * n_lags + lag].push(d, semivariance);
                            }
                        }
                    }
                }
                acc
            })
            .collect::<Vec<_>>();

        //merge in row order
        let mut totals = vec![BinAccumulator::default(); n_dirs * n_lags];
        for partial in partials.iter() {
            totals
                .iter_mut()
                .zip(partial.iter())
                .for_each(|(total, p)| total.merge(p));
        }

        let mut variogram = Vec::new();
        let mut dropped = 0;
        for dir in 0..n_dirs {
            let tolerance = self.directions.get(dir);
            let mut row = totals[dir * n_lags..(dir + 1) * n_lags]
                .iter()
                .zip(self.lags.iter())
                .filter_map(|(acc, bin)| {
                    if acc.count == 0 {
                        dropped += 1;
                        return None;
                    }
                    Some(EmpiricalVariogramPoint {
                        bin: LagBin {
                            direction: tolerance.map(|t| t.direction),
                            tolerance: tolerance.map(|t| t.tolerance),
                            ..*bin
                        },
                        mean_distance: acc.distance / acc.count as f64,
                        semivariance: acc.semivariance / acc.count as f64,
                        pair_count: acc.count,
                    })
                })
                .collect::<Vec<_>>();
            row.sort_by_key(|p| OrderedFloat(p.mean_distance));
            variogram.extend(row);
        }

        let variogram = ExperimentalVariogram {
            cutoff: self.cutoff,
            width: self.width,
            points: variogram,
        };
        tracing::debug!(
            samples = n,
            cutoff = self.cutoff,
            width = self.width,
            bins = variogram.len(),
            dropped,
            pairs = variogram.total_pairs(),
            "empirical variogram"
        );
        Ok(variogram)
    }

    /// Every pair within the cutoff (and within at least one direction window
    /// when directions are configured), in pair order.
    pub fn cloud(&self) -> Vec<CloudPoint> {
        let n = self.data.len();
        let points = self.data.points();
        let values = self.data.values();

        let rows = (0..n)
            .into_par_iter()
            .map(|i| {
                (i + 1..n)
                    .filter_map(|j| {
                        let h = points[j] - points[i];
                        let d = self.lag_distance(&h);
                        if d > self.cutoff {
                            return None;
                        }
                        if !self.directions.is_empty()
                            && !self.directions.iter().any(|t| t.contains(&h))
                        {
                            return None;
                        }
                        Some(CloudPoint {
                            i,
                            j,
                            distance: d,
                            direction: lag_direction(&h),
                            semivariance: 0.5 * (values[i] - values[j]).powi(2),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let cloud = rows.into_iter().flatten().collect::<Vec<_>>();
        tracing::debug!(samples = n, cutoff = self.cutoff, pairs = cloud.len(), "variogram cloud");
        cloud
    }
}

fn max_lag(data: &SpatialPointSet, anisotropy: Option<&Anisotropy>) -> f64 {
    match anisotropy {
        None => data.max_pairwise_distance(),
        Some(anisotropy) => {
            let points = data.points();
            (0..points.len())
                .flat_map(|i| (i + 1..points.len()).map(move |j| (i, j)))
                .map(|(i, j)| OrderedFloat(anisotropy.transform(&(points[j] - points[i])).norm()))
                .max()
                .map_or(0.0, |d| d.0)
        }
    }
}

/// Bins of `width` covering [0, cutoff]; the last bin ends at the cutoff.
fn lag_bins(cutoff: f64, width: f64, edges: BinEdges) -> Vec<LagBin> {
    let mut n = ((cutoff / width).ceil() as usize).max(1);
    if n > 1 && (n - 1) as f64 * width >= cutoff {
        n -= 1;
    }

    (0..n)
        .map(|k| {
            let lower = k as f64 * width;
            let upper = if k == n - 1 {
                cutoff
            } else {
                (k + 1) as f64 * width
            };
            let (lower_closed, upper_closed) = match edges {
                BinEdges::UpperClosed => (k == 0, true),
                BinEdges::LowerClosed => (true, k == n - 1),
            };
            LagBin {
                lower,
                upper,
                lower_closed,
                upper_closed,
                direction: None,
                tolerance: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;
    use nalgebra::Point2;
    use rand::prelude::*;
    use rand_distr::{Normal, Uniform};

    use super::*;
    use crate::geometry::direction;
    use crate::variography::experimental::{cloud, estimate};

    fn unit_square() -> SpatialPointSet {
        SpatialPointSet::from_points(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(0.0, 1.0),
                Point2::new(1.0, 1.0),
            ],
            vec![10.0, 12.0, 9.0, 11.0],
        )
        .unwrap()
    }

    fn random_field(n: usize, seed: u64) -> SpatialPointSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let coord = Uniform::new(0.0_f64, 100.0);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let points = (0..n)
            .map(|_| Point2::new(rng.sample(coord), rng.sample(coord)))
            .collect::<Vec<_>>();
        let values = points
            .iter()
            .map(|p| 0.05 * p.x + (p.y / 20.0).sin() + rng.sample(noise))
            .collect();
        SpatialPointSet::from_points(points, values).unwrap()
    }

    #[test]
    fn unit_square_two_bins() {
        let vgram = estimate(&unit_square(), &VariogramConfig::new(2.0, 1.0)).unwrap();
        assert_eq!(vgram.len(), 2);

        let first = vgram.points[0];
        assert_abs_diff_eq!(first.mean_distance, 1.0);
        assert_eq!(first.pair_count, 4);
        // (10,12), (10,9), (12,11), (9,11)
        assert_abs_diff_eq!(first.semivariance, (2.0 + 0.5 + 0.5 + 2.0) / 4.0);

        let second = vgram.points[1];
        assert_abs_diff_eq!(second.mean_distance, 2f64.sqrt());
        assert_eq!(second.pair_count, 2);
        // (10,11), (12,9)
        assert_abs_diff_eq!(second.semivariance, (0.5 + 4.5) / 2.0);
    }

    #[test]
    fn lower_closed_edges_move_boundary_pairs() {
        let config = VariogramConfig::new(2.0, 1.0).with_bin_edges(BinEdges::LowerClosed);
        let vgram = estimate(&unit_square(), &config).unwrap();
        // every pair lies in [1, 2)
        assert_eq!(vgram.len(), 1);
        assert_eq!(vgram.points[0].pair_count, 6);
    }

    #[test]
    fn default_cutoff_is_third_of_max_distance() {
        let data = random_field(60, 7);
        let vgram = estimate(&data, &VariogramConfig::default()).unwrap();
        assert_abs_diff_eq!(vgram.cutoff, data.max_pairwise_distance() / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vgram.width, vgram.cutoff / 15.0);
        assert!(vgram.points.iter().all(|p| p.mean_distance <= vgram.cutoff));
    }

    #[test]
    fn pair_counts_match_recount() {
        let data = random_field(120, 11);
        let config = VariogramConfig::new(40.0, 4.0);
        let vgram = estimate(&data, &config).unwrap();

        for point in vgram.points.iter() {
            let mut count = 0;
            for i in 0..data.len() {
                for j in i + 1..data.len() {
                    let d = crate::geometry::distance(&data.points()[i], &data.points()[j]);
                    if d <= 40.0 && point.bin.contains_distance(d) {
                        count += 1;
                    }
                }
            }
            assert_eq!(point.pair_count, count, "bin {:?}", point.bin);
            assert!(point.pair_count >= 1);
        }

        // sorted by mean distance
        assert!(vgram
            .points
            .windows(2)
            .all(|w| w[0].mean_distance <= w[1].mean_distance));
    }

    #[test]
    fn directional_counts_match_recount() {
        let data = random_field(100, 3);
        let directions = vec![
            DirectionTolerance::new(0.0, 22.5),
            DirectionTolerance::new(45.0, 30.0),
            DirectionTolerance::new(90.0, 22.5),
        ];
        let config = VariogramConfig::new(35.0, 5.0).with_directions(directions.clone());
        let vgram = estimate(&data, &config).unwrap();

        // grouped by direction in request order
        let order = vgram
            .points
            .iter()
            .map(|p| p.bin.direction.unwrap())
            .collect::<Vec<_>>();
        let mut sorted = order.clone();
        sorted.sort_by_key(|d| directions.iter().position(|t| t.direction == *d));
        assert_eq!(order, sorted);

        for point in vgram.points.iter() {
            let tolerance = directions
                .iter()
                .find(|t| Some(t.direction) == point.bin.direction)
                .unwrap();
            let mut count = 0;
            for i in 0..data.len() {
                for j in i + 1..data.len() {
                    let (a, b) = (&data.points()[i], &data.points()[j]);
                    let d = crate::geometry::distance(a, b);
                    if d <= 35.0
                        && point.bin.contains_distance(d)
                        && tolerance.contains_direction(direction(a, b))
                    {
                        count += 1;
                    }
                }
            }
            assert_eq!(point.pair_count, count);
        }
    }

    #[test]
    fn estimate_is_deterministic() {
        let data = random_field(200, 5);
        let config = VariogramConfig::new(30.0, 2.5);
        let a = estimate(&data, &config).unwrap();
        let b = estimate(&data, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cloud_has_every_pair_in_order() {
        let data = unit_square();
        let all = cloud(&data, &VariogramConfig::new(2.0, 1.0)).unwrap();
        let pairs = all.iter().map(|c| (c.i, c.j)).collect::<Vec<_>>();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        assert_abs_diff_eq!(all[0].direction, 0.0);
        assert_abs_diff_eq!(all[1].direction, 90.0);
        assert_abs_diff_eq!(all[2].semivariance, 0.5);

        let short = cloud(&data, &VariogramConfig::new(1.2, 1.0)).unwrap();
        assert_eq!(short.len(), 4);
    }

    #[test]
    fn collocated_pairs_land_in_first_bin() {
        let data = SpatialPointSet::from_points(
            vec![Point2::new(0.0, 0.0), Point2::new(0.0, 0.0), Point2::new(3.0, 0.0)],
            vec![1.0, 2.0, 3.0],
        )
        .unwrap();
        let config = VariogramConfig::new(4.0, 1.0)
            .with_directions(vec![DirectionTolerance::new(90.0, 10.0)]);
        let vgram = estimate(&data, &config).unwrap();
        assert_eq!(vgram.len(), 1);
        assert_eq!(vgram.points[0].mean_distance, 0.0);
        assert_abs_diff_eq!(vgram.points[0].semivariance, 0.5);
    }

    #[test]
    fn anisotropic_distances() {
        let data = SpatialPointSet::from_points(
            vec![Point2::new(0.0, 0.0), Point2::new(0.0, 1.0)],
            vec![0.0, 1.0],
        )
        .unwrap();
        let config = VariogramConfig::new(5.0, 1.0).with_anisotropy(Anisotropy::new(0.0, 0.5).unwrap());
        let vgram = estimate(&data, &config).unwrap();
        assert_abs_diff_eq!(vgram.points[0].mean_distance, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn bad_inputs() {
        let single = SpatialPointSet::from_points(vec![Point2::new(0.0, 0.0)], vec![1.0]).unwrap();
        assert!(matches!(
            estimate(&single, &VariogramConfig::default()),
            Err(GeostatError::InsufficientData { .. })
        ));

        let stacked = SpatialPointSet::from_points(
            vec![Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)],
            vec![1.0, 2.0],
        )
        .unwrap();
        assert!(matches!(
            estimate(&stacked, &VariogramConfig::default()),
            Err(GeostatError::InvalidParameter { name: "cutoff", .. })
        ));

        assert!(matches!(
            estimate(&unit_square(), &VariogramConfig::new(-1.0, 1.0)),
            Err(GeostatError::InvalidParameter { name: "cutoff", .. })
        ));
    }

    #[test]
    fn too_many_bins_is_invalid() {
        for width in [1e-300, 1e-9, 2.0 / (MAX_LAG_BINS as f64 * 2.0)] {
            assert!(matches!(
                estimate(&unit_square(), &VariogramConfig::new(2.0, width)),
                Err(GeostatError::InvalidParameter { name: "width", .. })
            ));
        }
        assert!(matches!(
            cloud(&unit_square(), &VariogramConfig::new(1e4, 1e-9)),
            Err(GeostatError::InvalidParameter { name: "width", .. })
        ));

        let width = 2.0 / (MAX_LAG_BINS as f64 * 0.8);
        let vgram = estimate(&unit_square(), &VariogramConfig::new(2.0, width)).unwrap();
        assert_eq!(vgram.total_pairs(), 6);
    }

    #[test]
    fn bins_cover_cutoff() {
        let bins = lag_bins(1.0, 0.1, BinEdges::UpperClosed);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.last().unwrap().upper, 1.0);

        let bins = lag_bins(1.05, 0.1, BinEdges::LowerClosed);
        assert_eq!(bins.len(), 11);
        assert!(bins.last().unwrap().contains_distance(1.05));
        assert!(bins[0].contains_distance(0.0));
    }
}
