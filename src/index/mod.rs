//! 参考基因组索引：FM 索引查询层、离线构建器与坐标定位。

pub mod build;
pub mod fm;
pub mod locator;
pub mod sa;

use serde::{Deserialize, Serialize};

/// 链方向。对 read 而言表示取原序列还是反向互补；对参考片段而言表示正链或反链拼接段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn is_reverse(self) -> bool {
        self == Strand::Reverse
    }

    pub fn flip(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }

    /// 作为数组下标（BitContext 中按方向存放 Peq）
    pub fn index(self) -> usize {
        match self {
            Strand::Forward => 0,
            Strand::Reverse => 1,
        }
    }
}

pub use fm::{Contig, GenomeIndex, IndexMeta, SaRange, Segment};
pub use locator::{Location, Locator};
