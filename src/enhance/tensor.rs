/// Tensor rank an enhancement capability accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRank {
    /// `[N]`
    Flat,
    /// `[1, N]`
    Batched,
}

/// Contiguous f32 buffer with an explicit shape
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl AudioTensor {
    /// Build a tensor; `None` when the shape doesn't cover the data exactly
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self { data, shape })
    }

    pub fn flat(data: Vec<f32>) -> Self {
        let len = data.len();
        Self { data, shape: vec![len] }
    }

    pub fn batched(data: Vec<f32>) -> Self {
        let len = data.len();
        Self { data, shape: vec![1, len] }
    }

    pub fn with_rank(data: Vec<f32>, rank: TensorRank) -> Self {
        match rank {
            TensorRank::Flat => Self::flat(data),
            TensorRank::Batched => Self::batched(data),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Reshape `[N]` or `[1, N]` (or `[1, 1, N]`) into `[1, N]`
    pub fn into_batched(self) -> Result<Self, Self> {
        let leading_ones = self.shape.len().saturating_sub(1);
        let single_row = !self.shape.is_empty()
            && self.shape[..leading_ones].iter().all(|&d| d == 1);
        if single_row {
            Ok(Self::batched(self.data))
        } else {
            Err(self)
        }
    }
}
