use rand::Rng;
use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::state::PlayerId;

// --- 核心数据结构定义 ---

/// 牌的颜色，共 7 种
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
    Pink,
}

impl Color {
    pub const ALL: [Color; 7] = [
        Color::Red, Color::Blue, Color::Green, Color::Yellow,
        Color::Purple, Color::Orange, Color::Pink,
    ];
}

pub const MIN_RANK: u8 = 1;
pub const MAX_RANK: u8 = 10;

/// 单张牌 (Card)
///
/// 颜色和点数在发牌后不再改变，`owner` 只在放置到旗帜或炮台时写入。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub color: Color,
    pub rank: u8,
    pub owner: Option<PlayerId>,
}

impl Card {
    pub fn new(color: Color, rank: u8) -> Card {
        debug_assert!((MIN_RANK..=MAX_RANK).contains(&rank), "点数必须在1到10之间");
        Card { color, rank, owner: None }
    }

    /// 手牌中 (颜色, 点数) 唯一确定一张牌
    pub fn same_face(&self, other: &Card) -> bool {
        self.color == other.color && self.rank == other.rank
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Color::Red => "Red",
            Color::Blue => "Blue",
            Color::Green => "Green",
            Color::Yellow => "Yellow",
            Color::Purple => "Purple",
            Color::Orange => "Orange",
            Color::Pink => "Pink",
        })
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::ALL
            .into_iter()
            .find(|c| c.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("未知颜色: {}", s))
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.color, self.rank)
    }
}

// --- 牌组生成 ---

/// 创建一副完整的 70 张牌 (7 种颜色 × 10 个点数)，未洗牌
pub fn create_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(Color::ALL.len() * MAX_RANK as usize);
    for color in Color::ALL {
        for rank in MIN_RANK..=MAX_RANK {
            deck.push(Card::new(color, rank));
        }
    }
    deck
}

/// 创建并洗好一副牌，摸牌从末尾弹出
pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = create_deck();
    deck.shuffle(rng);
    deck
}

// --- 单元测试 ---
