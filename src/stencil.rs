use crate::error::{Result, SchemeError};

/// Velocity numbering in one dimension: 0, 1, -1, 2, -2, ...
pub struct D1;

impl D1 {
    pub fn velocity(num: usize) -> [i32; 3] {
        let k = num.div_ceil(2) as i32;
        let vx = if num % 2 == 1 { k } else { -k };
        [vx, 0, 0]
    }
}

/// Two-dimensional velocity numbering, ring by ring.
pub struct D2Q25;

impl D2Q25 {
    pub const Q: usize = 25;

    pub const VELOCITIES: [[i32; 3]; 25] = [
        // Center
        [0, 0, 0],
        // Axis neighbors (4)
        [1, 0, 0], [0, 1, 0], [-1, 0, 0], [0, -1, 0],
        // Diagonal neighbors (4)
        [1, 1, 0], [-1, 1, 0], [-1, -1, 0], [1, -1, 0],
        // Second axis ring (4)
        [2, 0, 0], [0, 2, 0], [-2, 0, 0], [0, -2, 0],
        // Knight moves (8)
        [2, 1, 0], [1, 2, 0], [-1, 2, 0], [-2, 1, 0],
        [-2, -1, 0], [-1, -2, 0], [1, -2, 0], [2, -1, 0],
        // Second diagonal ring (4)
        [2, 2, 0], [-2, 2, 0], [-2, -2, 0], [2, -2, 0],
    ];
}

/// D3Q27 velocity numbering
pub struct D3Q27;

impl D3Q27 {
    /// Number of discrete velocities
    pub const Q: usize = 27;

    /// Discrete velocities (27 directions in 3D)
    pub const VELOCITIES: [[i32; 3]; 27] = [
        // Center
        [0, 0, 0],
        // Face neighbors (6)
        [1, 0, 0], [-1, 0, 0], [0, 1, 0], [0, -1, 0], [0, 0, 1], [0, 0, -1],
        // Edge neighbors (12)
        [1, 1, 0], [1, -1, 0], [-1, 1, 0], [-1, -1, 0],
        [1, 0, 1], [1, 0, -1], [-1, 0, 1], [-1, 0, -1],
        [0, 1, 1], [0, 1, -1], [0, -1, 1], [0, -1, -1],
        // Corner neighbors (8)
        [1, 1, 1], [1, 1, -1], [1, -1, 1], [1, -1, -1],
        [-1, 1, 1], [-1, 1, -1], [-1, -1, 1], [-1, -1, -1],
    ];
}

/// A numbered discrete velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Velocity {
    pub num: usize,
    pub v: [i32; 3],
}

impl Velocity {
    pub fn new(dim: usize, num: usize) -> Option<Self> {
        let v = match dim {
            1 => D1::velocity(num),
            2 => *D2Q25::VELOCITIES.get(num)?,
            3 => *D3Q27::VELOCITIES.get(num)?,
            _ => return None,
        };
        Some(Velocity { num, v })
    }

    pub fn vx(&self) -> i32 {
        self.v[0]
    }

    pub fn vy(&self) -> i32 {
        self.v[1]
    }

    pub fn vz(&self) -> i32 {
        self.v[2]
    }
}

/// Velocities of every elementary scheme.
///
/// Stands in for the velocity enumeration subsystem: it maps the velocity
/// numbers of each elementary scheme to vectors and provides the per-scheme
/// counts and the prefix-sum pointer table.
#[derive(Debug, Clone)]
pub struct Stencil {
    dim: usize,
    velocities: Vec<Vec<Velocity>>,
    nv_ptr: Vec<usize>,
}

impl Stencil {
    pub fn new(dim: usize, numbers: &[Vec<usize>]) -> Result<Self> {
        if !(1..=3).contains(&dim) {
            return Err(SchemeError::config("dim", format!("must be 1, 2 or 3, got {dim}")));
        }
        let mut velocities = Vec::with_capacity(numbers.len());
        for (k, nums) in numbers.iter().enumerate() {
            if nums.is_empty() {
                return Err(SchemeError::scheme_config(k, "velocities", "no velocity given"));
            }
            let mut vk = Vec::with_capacity(nums.len());
            for (i, &num) in nums.iter().enumerate() {
                if nums[..i].contains(&num) {
                    return Err(SchemeError::scheme_config(
                        k,
                        "velocities",
                        format!("velocity {num} appears twice"),
                    ));
                }
                let v = Velocity::new(dim, num).ok_or_else(|| {
                    SchemeError::scheme_config(
                        k,
                        "velocities",
                        format!("no velocity numbered {num} in dimension {dim}"),
                    )
                })?;
                vk.push(v);
            }
            velocities.push(vk);
        }
        let mut nv_ptr = Vec::with_capacity(velocities.len() + 1);
        nv_ptr.push(0);
        for vk in &velocities {
            nv_ptr.push(nv_ptr[nv_ptr.len() - 1] + vk.len());
        }
        Ok(Stencil {
            dim,
            velocities,
            nv_ptr,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nstencils(&self) -> usize {
        self.velocities.len()
    }

    /// Number of velocities of each elementary scheme.
    pub fn nv(&self) -> Vec<usize> {
        self.velocities.iter().map(Vec::len).collect()
    }

    /// Prefix sums of `nv`, of length `nstencils + 1`.
    pub fn nv_ptr(&self) -> &[usize] {
        &self.nv_ptr
    }

    pub fn nvtot(&self) -> usize {
        self.nv_ptr[self.nv_ptr.len() - 1]
    }

    pub fn velocities(&self, k: usize) -> &[Velocity] {
        &self.velocities[k]
    }

    /// Velocities of all schemes, scheme after scheme.
    pub fn all_velocities(&self) -> impl Iterator<Item = &Velocity> {
        self.velocities.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_d1_numbering() {
        let vx: Vec<i32> = (0..5).map(|n| D1::velocity(n)[0]).collect();
        assert_eq!(vx, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn test_opposites_in_tables() {
        // every velocity table is symmetric under v -> -v
        for table in [&D2Q25::VELOCITIES[..], &D3Q27::VELOCITIES[..]] {
            for v in table {
                let opposite = [-v[0], -v[1], -v[2]];
                assert!(table.contains(&opposite), "{v:?} has no opposite");
            }
        }
        assert_eq!(D2Q25::VELOCITIES.len(), D2Q25::Q);
        assert_eq!(D3Q27::VELOCITIES.len(), D3Q27::Q);
    }

    #[test]
    fn test_pointer_table() {
        let stencil = Stencil::new(2, &[vec![1, 2, 3, 4], (0..5).collect()]).unwrap();
        assert_eq!(stencil.nv(), vec![4, 5]);
        assert_eq!(stencil.nv_ptr(), &[0, 4, 9]);
        assert_eq!(stencil.nvtot(), 9);
        assert_eq!(stencil.velocities(0)[2].v, [-1, 0, 0]);
        assert_eq!(stencil.all_velocities().count(), 9);
    }

    #[test]
    fn test_invalid_stencils() {
        assert!(Stencil::new(4, &[vec![0]]).is_err());
        assert!(Stencil::new(1, &[vec![]]).is_err());
        assert!(Stencil::new(1, &[vec![0, 1, 0]]).is_err());
        assert!(Stencil::new(3, &[vec![27]]).is_err());
    }
}
