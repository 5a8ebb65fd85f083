use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::card::Card;

/// 阵型等级 (Category)
/// 变体按从弱到强排列，可以直接利用 `Ord` 比较等级。
/// `None` 表示没有牌，永远输给任何阵型。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    None = 0,
    HighCard = 1,
    Pair = 2,
    TwoPair = 3,
    ThreeOfAKind = 4,
    Straight = 5,
    Flush = 6,
    FullHouse = 7,
    FourOfAKind = 8,
    StraightFlush = 9,
}

/// 一组牌的评估结果：等级 + 用于平局比较的点数序列
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Formation {
    pub category: Category,
    pub tie_break: Vec<u8>,
}

/// 同花至少需要的牌数
const MIN_FLUSH_LEN: usize = 3;

impl Formation {
    pub const NONE: Formation = Formation { category: Category::None, tie_break: Vec::new() };

    /// 比较两个阵型。
    ///
    /// 先比较等级，等级相同时逐个比较 `tie_break`，
    /// 第一个不同的元素决定胜负；比较完较短的序列仍无差别则为平局。
    pub fn compare(&self, other: &Formation) -> Ordering {
        self.category.cmp(&other.category).then_with(|| {
            self.tie_break
                .iter()
                .zip(&other.tie_break)
                .map(|(a, b)| a.cmp(b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Category::None => "None",
            Category::HighCard => "High Card",
            Category::Pair => "Pair",
            Category::TwoPair => "Two Pair",
            Category::ThreeOfAKind => "Three of a Kind",
            Category::Straight => "Straight",
            Category::Flush => "Flush",
            Category::FullHouse => "Full House",
            Category::FourOfAKind => "Four of a Kind",
            Category::StraightFlush => "Straight Flush",
        })
    }
}

impl fmt::Display for Formation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.category)
    }
}

// --- 阵型评估逻辑 ---

/// 评估某个玩家在一面旗帜上的牌所组成的阵型
///
/// - 同花：至少 3 张且颜色全部相同。
/// - 顺子：牌数必须等于旗帜容量，点数连续递增，不允许首尾相接。
/// - 其他等级按点数分组：先按出现次数、再按点数从大到小排序，
///   排序后的点数序列即为平局比较的依据。
pub fn evaluate_formation(cards: &[Card], capacity: usize) -> Formation {
    if cards.is_empty() {
        return Formation::NONE;
    }

    let mut ranks: Vec<u8> = cards.iter().map(|c| c.rank).collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.len() >= MIN_FLUSH_LEN && cards.windows(2).all(|w| w[0].color == w[1].color);
    let is_straight = cards.len() == capacity && ranks.windows(2).all(|w| w[0] == w[1] + 1);

    // 顺子的点数互不相同，不会同时构成对子类牌型
    if is_straight {
        let category = if is_flush { Category::StraightFlush } else { Category::Straight };
        return Formation { category, tie_break: vec![ranks[0]] };
    }

    // 统计点数出现次数，用于判断四条、葫芦、三条、两对、一对
    let mut counts: HashMap<u8, u8> = HashMap::new();
    for rank in &ranks {
        *counts.entry(*rank).or_insert(0) += 1;
    }

    // 转换为 (出现次数, 点数) 的列表，并按次数和点数从大到小排序
    let mut groups: Vec<(u8, u8)> = counts.into_iter().map(|(r, c)| (c, r)).collect();
    groups.sort_by(|a, b| b.cmp(a));
    let tie_break: Vec<u8> = groups.iter().map(|&(_, r)| r).collect();

    let top = groups[0].0;
    let second = groups.get(1).map_or(0, |g| g.0);

    let category = match (top, second) {
        (t, _) if t >= 4 => Category::FourOfAKind,
        (3, 2) => Category::FullHouse,
        _ if is_flush => Category::Flush,
        (3, _) => Category::ThreeOfAKind,
        (2, 2) => Category::TwoPair,
        (2, _) => Category::Pair,
        _ => Category::HighCard,
    };

    Formation { category, tie_break }
}

// --- 单元测试 ---
