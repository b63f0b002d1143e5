//! Distance tables with a temporary-move channel.

use nalgebra::Vector3;

/// Symmetric distance table between all pairs of one particle set.
///
/// `displacement(i, j)` is `r_i - r_j`. While a move of particle `iat` is
/// pending, `temp_distance(j)` / `temp_displacement(j)` hold the distances
/// from the proposed position to every other particle; the committed
/// entries stay untouched until `commit`.
#[derive(Debug, Clone)]
pub struct DistanceTableAA {
    n: usize,
    dist: Vec<f64>,
    displ: Vec<Vector3<f64>>,
    temp_r: Vec<f64>,
    temp_dr: Vec<Vector3<f64>>,
}

impl DistanceTableAA {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            dist: vec![0.0; n * n],
            displ: vec![Vector3::zeros(); n * n],
            temp_r: vec![0.0; n],
            temp_dr: vec![Vector3::zeros(); n],
        }
    }

    /// Recompute every pair from committed positions.
    pub fn evaluate(&mut self, r: &[Vector3<f64>]) {
        for i in 0..self.n {
            self.dist[i * self.n + i] = 0.0;
            self.displ[i * self.n + i] = Vector3::zeros();
            for j in (i + 1)..self.n {
                let dr = r[i] - r[j];
                let d = dr.norm();
                self.dist[i * self.n + j] = d;
                self.dist[j * self.n + i] = d;
                self.displ[i * self.n + j] = dr;
                self.displ[j * self.n + i] = -dr;
            }
        }
    }

    /// Fill the temporary row for particle `iat` at `rnew`.
    pub fn move_particle(&mut self, r: &[Vector3<f64>], iat: usize, rnew: &Vector3<f64>) {
        for (j, rj) in r.iter().enumerate() {
            let dr = rnew - rj;
            self.temp_r[j] = dr.norm();
            self.temp_dr[j] = dr;
        }
        self.temp_r[iat] = 0.0;
        self.temp_dr[iat] = Vector3::zeros();
    }

    /// Promote the temporary row of `iat` to committed.
    pub fn commit(&mut self, iat: usize) {
        for j in 0..self.n {
            if j == iat {
                continue;
            }
            self.dist[iat * self.n + j] = self.temp_r[j];
            self.dist[j * self.n + iat] = self.temp_r[j];
            self.displ[iat * self.n + j] = self.temp_dr[j];
            self.displ[j * self.n + iat] = -self.temp_dr[j];
        }
    }

    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.dist[i * self.n + j]
    }

    #[inline]
    pub fn displacement(&self, i: usize, j: usize) -> Vector3<f64> {
        self.displ[i * self.n + j]
    }

    #[inline]
    pub fn temp_distance(&self, j: usize) -> f64 {
        self.temp_r[j]
    }

    #[inline]
    pub fn temp_displacement(&self, j: usize) -> Vector3<f64> {
        self.temp_dr[j]
    }
}

/// Distance table between a fixed source set (ions) and a moving target set.
///
/// Indexed as `(source, target)`; `displacement(I, i)` is `r_i - R_I`.
#[derive(Debug, Clone)]
pub struct DistanceTableAB {
    sources: Vec<Vector3<f64>>,
    source_groups: Vec<usize>,
    num_source_groups: usize,
    n_targets: usize,
    dist: Vec<f64>,
    displ: Vec<Vector3<f64>>,
    temp_r: Vec<f64>,
    temp_dr: Vec<Vector3<f64>>,
}

impl DistanceTableAB {
    pub fn new(
        sources: Vec<Vector3<f64>>,
        source_groups: Vec<usize>,
        num_source_groups: usize,
        n_targets: usize,
    ) -> Self {
        let ns = sources.len();
        Self {
            sources,
            source_groups,
            num_source_groups,
            n_targets,
            dist: vec![0.0; ns * n_targets],
            displ: vec![Vector3::zeros(); ns * n_targets],
            temp_r: vec![0.0; ns],
            temp_dr: vec![Vector3::zeros(); ns],
        }
    }

    pub fn evaluate(&mut self, r: &[Vector3<f64>]) {
        for (s, rs) in self.sources.iter().enumerate() {
            for (i, ri) in r.iter().enumerate() {
                let dr = ri - rs;
                self.dist[s * self.n_targets + i] = dr.norm();
                self.displ[s * self.n_targets + i] = dr;
            }
        }
    }

    pub fn move_particle(&mut self, rnew: &Vector3<f64>) {
        for (s, rs) in self.sources.iter().enumerate() {
            let dr = rnew - rs;
            self.temp_r[s] = dr.norm();
            self.temp_dr[s] = dr;
        }
    }

    pub fn commit(&mut self, iat: usize) {
        for s in 0..self.sources.len() {
            self.dist[s * self.n_targets + iat] = self.temp_r[s];
            self.displ[s * self.n_targets + iat] = self.temp_dr[s];
        }
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn num_source_groups(&self) -> usize {
        self.num_source_groups
    }

    pub fn source_group(&self, s: usize) -> usize {
        self.source_groups[s]
    }

    pub fn source_position(&self, s: usize) -> Vector3<f64> {
        self.sources[s]
    }

    #[inline]
    pub fn distance(&self, s: usize, i: usize) -> f64 {
        self.dist[s * self.n_targets + i]
    }

    #[inline]
    pub fn displacement(&self, s: usize, i: usize) -> Vector3<f64> {
        self.displ[s * self.n_targets + i]
    }

    #[inline]
    pub fn temp_distance(&self, s: usize) -> f64 {
        self.temp_r[s]
    }

    #[inline]
    pub fn temp_displacement(&self, s: usize) -> Vector3<f64> {
        self.temp_dr[s]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aa_temp_move_does_not_touch_committed() {
        let r = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
        ];
        let mut table = DistanceTableAA::new(3);
        table.evaluate(&r);
        assert_relative_eq!(table.distance(0, 1), 1.0);
        assert_relative_eq!(table.displacement(1, 0).x, 1.0);

        table.move_particle(&r, 0, &Vector3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(table.temp_distance(1), 10.0_f64.sqrt());
        assert_relative_eq!(table.temp_distance(2), 13.0_f64.sqrt());
        assert_relative_eq!(table.distance(0, 1), 1.0);

        table.commit(0);
        assert_relative_eq!(table.distance(0, 1), 10.0_f64.sqrt());
        assert_relative_eq!(table.distance(1, 0), 10.0_f64.sqrt());
        assert_relative_eq!(table.displacement(2, 0).z, -3.0);
    }

    #[test]
    fn test_ab_displacement_points_from_source() {
        let mut table = DistanceTableAB::new(vec![Vector3::new(1.0, 0.0, 0.0)], vec![0], 1, 2);
        let r = vec![Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 2.0, 0.0)];
        table.evaluate(&r);
        assert_relative_eq!(table.distance(0, 1), 2.0);
        assert_relative_eq!(table.displacement(0, 0).x, -1.0);

        table.move_particle(&Vector3::new(4.0, 0.0, 0.0));
        table.commit(0);
        assert_relative_eq!(table.distance(0, 0), 3.0);
    }
}
