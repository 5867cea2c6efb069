//! 细分表
//!
//! 驱动器只接受一组离散的"每转步数"。`MR<index>` 中的 index 即本表下标。

/// 驱动器支持的每转步数（严格递增）
pub const RESOLUTION_TABLE: [u32; 15] = [
    200, 400, 1000, 2000, 5000, 10000, 12800, 18000, 20000, 21600, 25000, 25400, 36000, 50000,
    50800,
];

/// 允许请求的最小细分
pub const MIN_RESOLUTION: u32 = 200;

/// 下标 2 的模式在硬件上不可靠，统一改用下标 3
const UNRELIABLE_INDEX: usize = 2;
const REPLACEMENT_INDEX: usize = 3;

/// 解析后的细分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// 细分表下标（`MR` 命令参数）
    pub index: usize,
    /// 每转步数
    pub steps_per_rev: u32,
}

/// 细分查找表
#[derive(Debug, Clone, Copy)]
pub struct ResolutionTable {
    entries: &'static [u32],
}

impl Default for ResolutionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ResolutionTable {
    /// 驱动器标准细分表
    pub const fn standard() -> Self {
        Self {
            entries: &RESOLUTION_TABLE,
        }
    }

    /// 表项
    pub fn entries(&self) -> &'static [u32] {
        self.entries
    }

    /// 查找某个细分值的下标
    pub fn index_of(&self, steps_per_rev: u32) -> Option<usize> {
        self.entries.iter().position(|&v| v == steps_per_rev)
    }

    /// 是否为驱动器支持的细分值
    pub fn contains(&self, steps_per_rev: u32) -> bool {
        self.index_of(steps_per_rev).is_some()
    }

    /// 线性扫描（不做重映射）
    ///
    /// 以下标 0 和 `|requested - 200|` 为初值，遍历整张表，距离不大于当前最优时
    /// 更新，因此距离相同时取表中靠后（更大）的值。
    fn scan(&self, requested: u32) -> usize {
        let requested = i64::from(requested);
        let mut best = 0;
        let mut best_diff = (requested - i64::from(self.entries[0])).abs();

        for (index, &value) in self.entries.iter().enumerate() {
            let diff = (i64::from(value) - requested).abs();
            if diff <= best_diff {
                best = index;
                best_diff = diff;
            }
        }
        best
    }

    /// 将任意请求的细分映射到最近的支持值
    ///
    /// 从不失败：超出表范围的请求落到边缘值。下标 2 会被重定向到下标 3。
    pub fn nearest(&self, requested: u32) -> Resolution {
        let mut index = self.scan(requested);
        if index == UNRELIABLE_INDEX {
            index = REPLACEMENT_INDEX;
        }
        Resolution {
            index,
            steps_per_rev: self.entries[index],
        }
    }
}
