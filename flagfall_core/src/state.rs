use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::card::{self, Card};
use crate::error::MatchError;
use crate::flag::{Flag, FlagKind};

pub type MatchId = Uuid;
pub type PlayerId = Uuid;

/// 固定的棋盘布局：(旗帜种类, 容量)
pub const BOARD_LAYOUT: [(FlagKind, usize); 9] = [
    (FlagKind::Outpost, 2),
    (FlagKind::Garrison, 3),
    (FlagKind::Encampment, 3),
    (FlagKind::Encampment, 3),
    (FlagKind::Stronghold, 5),
    (FlagKind::Encampment, 3),
    (FlagKind::Encampment, 3),
    (FlagKind::Citadel, 4),
    (FlagKind::Outpost, 2),
];

pub const PLAYER_COUNT: usize = 2;
pub const CANNON_SLOTS: usize = 2;

/// 比赛配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// 开局手牌数量，同时也是初始手牌上限 (3 到 5 张)
    pub initial_hand_size: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig { initial_hand_size: 5 }
    }
}

impl MatchConfig {
    pub const HAND_SIZES: std::ops::RangeInclusive<usize> = 3..=5;

    pub fn validate(&self) -> Result<(), MatchError> {
        if Self::HAND_SIZES.contains(&self.initial_hand_size) {
            Ok(())
        } else {
            Err(MatchError::HandSize(self.initial_hand_size))
        }
    }
}

/// 冻结状态：限制正常放牌，直到特殊能力结算完毕
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind")]
pub enum Freeze {
    #[default]
    None,
    /// 炮台开火后等待摧毁
    Cannon,
    /// 营地冲锋：owner 不能放牌，对手只能放到这面旗帜
    Encampment { flag_index: usize, owner: PlayerId },
}

/// 比赛的胜者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Player(PlayerId),
    Tie,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Winner::Player(id) => write!(f, "{}", id),
            Winner::Tie => write!(f, "Tie"),
        }
    }
}

/// `is_game_over` 的查询结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub over: bool,
    pub winner: Option<Winner>,
    pub scores: HashMap<PlayerId, u32>,
}

/// 一场比赛的完整状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    pub match_id: MatchId,
    // 参与玩家的固定顺序，所有 "第一个玩家" 的判定都以此为准
    pub players: Vec<PlayerId>,
    // 牌堆，从末尾摸牌
    pub deck: Vec<Card>,
    pub hands: HashMap<PlayerId, Vec<Card>>,
    pub max_hand_size: HashMap<PlayerId, usize>,
    pub board: Vec<Flag>,
    pub cannons: HashMap<PlayerId, Vec<Card>>,
    pub fired_cannons: HashMap<PlayerId, bool>,
    pub scores: HashMap<PlayerId, u32>,

    pub attack_privilege: Option<PlayerId>,
    pub freeze: Freeze,
    pub citadel_privilege: Option<PlayerId>,
    pub citadel_used: bool,

    // 整场比赛已放置的牌数，空棋盘不会被判定为完成
    pub cards_placed: u32,
    pub game_over: bool,
    pub winner: Option<Winner>,
}

// --- 比赛生命周期 ---

impl MatchState {
    /// 创建一场新比赛：洗牌、摆放 9 面旗帜、给每位玩家发初始手牌
    pub fn create(player_ids: &[PlayerId], config: MatchConfig) -> Result<MatchState, MatchError> {
        Self::create_with_rng(player_ids, config, &mut rand::rng())
    }

    pub fn create_with_rng<R: Rng + ?Sized>(
        player_ids: &[PlayerId],
        config: MatchConfig,
        rng: &mut R,
    ) -> Result<MatchState, MatchError> {
        Self::with_layout(player_ids, config, &BOARD_LAYOUT, card::shuffled_deck(rng))
    }

    /// 使用指定的棋盘布局和牌堆创建比赛
    pub(crate) fn with_layout(
        player_ids: &[PlayerId],
        config: MatchConfig,
        layout: &[(FlagKind, usize)],
        deck: Vec<Card>,
    ) -> Result<MatchState, MatchError> {
        config.validate()?;
        if player_ids.len() != PLAYER_COUNT {
            return Err(MatchError::PlayerCount(player_ids.len()));
        }
        if let Some(dup) = player_ids.iter().enumerate().find_map(|(i, id)| player_ids[..i].contains(id).then_some(*id)) {
            return Err(MatchError::DuplicatePlayer(dup));
        }

        let players = player_ids.to_vec();

        let mut state = MatchState {
            match_id: Uuid::new_v4(),
            deck,
            hands: players.iter().map(|id| (*id, Vec::new())).collect(),
            max_hand_size: players.iter().map(|id| (*id, config.initial_hand_size)).collect(),
            board: layout.iter().map(|&(kind, capacity)| Flag::new(kind, capacity, &players)).collect(),
            cannons: players.iter().map(|id| (*id, Vec::new())).collect(),
            fired_cannons: players.iter().map(|id| (*id, false)).collect(),
            scores: players.iter().map(|id| (*id, 0)).collect(),
            attack_privilege: None,
            freeze: Freeze::None,
            citadel_privilege: None,
            citadel_used: false,
            cards_placed: 0,
            game_over: false,
            winner: None,
            players,
        };

        // 轮流发牌，与实体桌面发牌顺序一致
        for _ in 0..config.initial_hand_size {
            for id in state.players.clone() {
                if let Some(card) = state.deck.pop() {
                    state.hands.entry(id).or_default().push(card);
                }
            }
        }

        Ok(state)
    }

    pub fn ensure_player(&self, player: &PlayerId) -> Result<(), MatchError> {
        if self.players.contains(player) { Ok(()) } else { Err(MatchError::UnknownPlayer(*player)) }
    }

    pub fn ensure_flag(&self, flag_index: usize) -> Result<(), MatchError> {
        if flag_index < self.board.len() { Ok(()) } else { Err(MatchError::UnknownFlag(flag_index)) }
    }

    pub fn hand(&self, player: &PlayerId) -> &[Card] {
        self.hands.get(player).map_or(&[], |h| h.as_slice())
    }

    pub fn cannon(&self, player: &PlayerId) -> &[Card] {
        self.cannons.get(player).map_or(&[], |c| c.as_slice())
    }

    pub fn has_fired(&self, player: &PlayerId) -> bool {
        self.fired_cannons.get(player).copied().unwrap_or(false)
    }

    pub fn opponent_of(&self, player: &PlayerId) -> Option<PlayerId> {
        self.players.iter().find(|id| *id != player).copied()
    }

    /// 牌堆不为空时，把玩家手牌补到上限
    pub fn draw_up_to_max(&mut self, player: &PlayerId) {
        let max = self.max_hand_size.get(player).copied().unwrap_or(0);
        let hand = self.hands.entry(*player).or_default();
        while hand.len() < max {
            match self.deck.pop() {
                Some(card) => hand.push(card),
                None => break,
            }
        }
    }

    /// 重新统计每位玩家占领的已完成旗帜数量
    pub fn rescore(&mut self) {
        let mut scores: HashMap<PlayerId, u32> = self.players.iter().map(|id| (*id, 0)).collect();
        for flag in self.board.iter().filter(|f| f.is_complete()) {
            if let Some(owner) = flag.claimed_by {
                *scores.entry(owner).or_insert(0) += 1;
            }
        }
        self.scores = scores;
    }

    /// 每面旗帜都被所有玩家放满，并且至少放过一张牌
    pub fn board_complete(&self) -> bool {
        self.cards_placed > 0 && self.board.iter().all(|f| f.is_complete())
    }

    /// 如果比赛刚刚结束，确定胜者并返回结果；已经结束或尚未结束时返回 None
    pub(crate) fn finalize_if_complete(&mut self) -> Option<GameOutcome> {
        if self.game_over || !self.board_complete() {
            return None;
        }
        self.rescore();

        let top = self.scores.values().copied().max().unwrap_or(0);
        let leaders: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|id| self.scores.get(id).copied().unwrap_or(0) == top)
            .copied()
            .collect();
        self.winner = Some(match leaders.as_slice() {
            [single] => Winner::Player(*single),
            _ => Winner::Tie,
        });
        self.game_over = true;
        tracing::debug!(match_id = %self.match_id, winner = ?self.winner, "比赛结束");

        Some(self.is_game_over())
    }

    /// 查询比赛是否结束，多次调用结果相同
    pub fn is_game_over(&self) -> GameOutcome {
        GameOutcome {
            over: self.game_over,
            winner: self.winner,
            scores: self.scores.clone(),
        }
    }
}

// --- 单元测试 ---
