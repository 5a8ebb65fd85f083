use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::card::Card;
use crate::error::MatchError;
use crate::flag::Trigger;
use crate::state::*;

/// 放牌的目标：棋盘上的某面旗帜，或者自己的炮台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceTarget {
    Flag(usize),
    Cannon,
}

/// 动作被拒绝的原因，只用于日志，不会返回给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    GameOver,
    CardNotInHand,
    CitadelHeldByOther,
    Frozen,
    FlagFull,
    AttackPending,
    CannonFired,
    CannonFull,
    NoAttackPrivilege,
    NoCitadelPrivilege,
    CardNotFound,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rejection::GameOver => "比赛已结束",
            Rejection::CardNotInHand => "手牌中没有这张牌",
            Rejection::CitadelHeldByOther => "对手持有城堡移动权",
            Rejection::Frozen => "营地冲锋冻结中",
            Rejection::FlagFull => "旗帜已放满",
            Rejection::AttackPending => "等待攻击结算",
            Rejection::CannonFired => "炮台已经开过火",
            Rejection::CannonFull => "炮台已满",
            Rejection::NoAttackPrivilege => "没有攻击权",
            Rejection::NoCitadelPrivilege => "没有城堡移动权",
            Rejection::CardNotFound => "找不到这张牌",
        })
    }
}

/// 一次动作的结果
///
/// `finished` 只在使比赛结束的那一次动作中为 `Some`，
/// 传输层可以据此保证结束通知只发送一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub accepted: bool,
    pub finished: Option<GameOutcome>,
}

impl ActionResult {
    fn rejected() -> Self {
        ActionResult { accepted: false, finished: None }
    }

    fn accepted(finished: Option<GameOutcome>) -> Self {
        ActionResult { accepted: true, finished }
    }
}

// --- 合法性判断 ---
// 以下函数都是只读的，机器人对手也复用它们。

impl MatchState {
    fn place_rejection(&self, player: &PlayerId, card: &Card, target: PlaceTarget) -> Option<Rejection> {
        if self.game_over {
            return Some(Rejection::GameOver);
        }
        if !self.hand(player).iter().any(|c| c.same_face(card)) {
            return Some(Rejection::CardNotInHand);
        }
        if self.citadel_privilege.is_some_and(|holder| holder != *player) {
            return Some(Rejection::CitadelHeldByOther);
        }

        match target {
            PlaceTarget::Cannon => {
                // 攻击结算前炮台不能装填，未结算的攻击权不会被炮台抢走
                if self.attack_privilege.is_some() {
                    return Some(Rejection::AttackPending);
                }
                if self.has_fired(player) {
                    return Some(Rejection::CannonFired);
                }
                if self.cannon(player).len() >= CANNON_SLOTS {
                    return Some(Rejection::CannonFull);
                }
            }
            PlaceTarget::Flag(flag_index) => {
                if self.attack_privilege.is_some() {
                    return Some(Rejection::AttackPending);
                }
                match self.freeze {
                    Freeze::Encampment { flag_index: frozen, owner } if owner == *player || frozen != flag_index => {
                        return Some(Rejection::Frozen);
                    }
                    Freeze::Cannon => return Some(Rejection::Frozen),
                    _ => {}
                }
                if self.board[flag_index].is_full(player) {
                    return Some(Rejection::FlagFull);
                }
            }
        }
        None
    }

    fn destroy_rejection(&self, attacker: &PlayerId, card: &Card) -> Option<Rejection> {
        if self.game_over {
            return Some(Rejection::GameOver);
        }
        if self.attack_privilege != Some(*attacker) {
            return Some(Rejection::NoAttackPrivilege);
        }
        let on_board = self.board.iter().any(|f| f.cards.values().any(|cards| cards.contains(card)));
        let in_cannon = self.cannons.values().any(|cards| cards.contains(card));
        if !on_board && !in_cannon {
            return Some(Rejection::CardNotFound);
        }
        None
    }

    fn citadel_rejection(&self, player: &PlayerId, from_flag: usize, card: &Card) -> Option<Rejection> {
        if self.game_over {
            return Some(Rejection::GameOver);
        }
        if self.citadel_privilege != Some(*player) {
            return Some(Rejection::NoCitadelPrivilege);
        }
        if !self.board[from_flag].slot(player).iter().any(|c| c.same_face(card)) {
            return Some(Rejection::CardNotFound);
        }
        None
    }

    pub fn can_place(&self, player: &PlayerId, card: &Card, target: PlaceTarget) -> Result<bool, MatchError> {
        self.ensure_player(player)?;
        if let PlaceTarget::Flag(flag_index) = target {
            self.ensure_flag(flag_index)?;
        }
        Ok(self.place_rejection(player, card, target).is_none())
    }

    pub fn can_destroy(&self, attacker: &PlayerId, card: &Card) -> Result<bool, MatchError> {
        self.ensure_player(attacker)?;
        Ok(self.destroy_rejection(attacker, card).is_none())
    }

    pub fn can_move(&self, player: &PlayerId, from_flag: usize, to_flag: usize, card: &Card) -> Result<bool, MatchError> {
        self.ensure_player(player)?;
        self.ensure_flag(from_flag)?;
        self.ensure_flag(to_flag)?;
        Ok(self.citadel_rejection(player, from_flag, card).is_none())
    }

    pub fn can_recall(&self, player: &PlayerId, flag_index: usize, card: &Card) -> Result<bool, MatchError> {
        self.ensure_player(player)?;
        self.ensure_flag(flag_index)?;
        Ok(self.citadel_rejection(player, flag_index, card).is_none())
    }
}

// --- 核心动作处理 ---

impl MatchState {
    /// 从手牌中打出一张牌，放到旗帜或炮台上
    ///
    /// 成功后会重新结算目标旗帜、补充手牌、重新计分，并检查比赛是否结束。
    pub fn apply_place(&mut self, player: PlayerId, card: Card, target: PlaceTarget) -> Result<ActionResult, MatchError> {
        self.ensure_player(&player)?;
        if let PlaceTarget::Flag(flag_index) = target {
            self.ensure_flag(flag_index)?;
        }
        if let Some(reason) = self.place_rejection(&player, &card, target) {
            debug!(%player, %card, ?target, %reason, "放牌被拒绝");
            return Ok(ActionResult::rejected());
        }

        let Some(mut placed) = self.take_from_hand(&player, &card) else {
            return Ok(ActionResult::rejected());
        };
        placed.owner = Some(player);
        self.cards_placed += 1;

        match target {
            PlaceTarget::Cannon => {
                self.cannons.entry(player).or_default().push(placed);
                self.arm_cannon(player);
            }
            PlaceTarget::Flag(flag_index) => {
                self.board[flag_index].cards.entry(player).or_default().push(placed);
                self.resolve_flag(flag_index, player);
            }
        }

        self.draw_up_to_max(&player);
        self.rescore();
        Ok(ActionResult::accepted(self.finalize_if_complete()))
    }

    /// 使用攻击权摧毁任意一张已放置的牌 (旗帜或炮台上)
    pub fn apply_destroy(&mut self, attacker: PlayerId, card: Card) -> Result<ActionResult, MatchError> {
        self.ensure_player(&attacker)?;
        if let Some(reason) = self.destroy_rejection(&attacker, &card) {
            debug!(%attacker, %card, %reason, "摧毁被拒绝");
            return Ok(ActionResult::rejected());
        }

        let removed = self.board.iter_mut().find_map(|flag| flag.remove_card(&card)).or_else(|| {
            self.cannons.values_mut().find_map(|cards| {
                let idx = cards.iter().position(|c| *c == card)?;
                Some(cards.remove(idx))
            })
        });
        if removed.is_none() {
            return Ok(ActionResult::rejected());
        }
        debug!(%attacker, %card, "牌被摧毁");

        self.attack_privilege = None;
        self.freeze = Freeze::None;
        self.resolve_board(attacker);
        self.rescore();
        Ok(ActionResult::accepted(self.finalize_if_complete()))
    }

    /// 使用城堡移动权，把自己的一张牌从一面旗帜移到另一面
    ///
    /// 目标旗帜已满时牌留在原处，但移动权仍然被消耗。
    pub fn apply_move(&mut self, player: PlayerId, from_flag: usize, to_flag: usize, card: Card) -> Result<ActionResult, MatchError> {
        self.ensure_player(&player)?;
        self.ensure_flag(from_flag)?;
        self.ensure_flag(to_flag)?;
        if let Some(reason) = self.citadel_rejection(&player, from_flag, &card) {
            debug!(%player, %card, from_flag, to_flag, %reason, "移动被拒绝");
            return Ok(ActionResult::rejected());
        }

        self.citadel_privilege = None;
        if from_flag == to_flag || !self.board[to_flag].is_full(&player) {
            if let Some(moving) = self.take_from_slot(&player, from_flag, &card) {
                self.board[to_flag].cards.entry(player).or_default().push(moving);
            }
        } else {
            debug!(%player, to_flag, "目标旗帜已满，移动作废");
        }

        self.resolve_board(player);
        self.rescore();
        Ok(ActionResult::accepted(self.finalize_if_complete()))
    }

    /// 使用城堡移动权，把自己的一张牌从旗帜收回手牌
    pub fn apply_recall(&mut self, player: PlayerId, flag_index: usize, card: Card) -> Result<ActionResult, MatchError> {
        self.ensure_player(&player)?;
        self.ensure_flag(flag_index)?;
        if let Some(reason) = self.citadel_rejection(&player, flag_index, &card) {
            debug!(%player, %card, flag_index, %reason, "收回被拒绝");
            return Ok(ActionResult::rejected());
        }

        self.citadel_privilege = None;
        if let Some(mut recalled) = self.take_from_slot(&player, flag_index, &card) {
            recalled.owner = None;
            self.hands.entry(player).or_default().push(recalled);
        }

        self.resolve_board(player);
        self.rescore();
        Ok(ActionResult::accepted(self.finalize_if_complete()))
    }

    // --- 辅助逻辑函数 ---

    fn take_from_hand(&mut self, player: &PlayerId, card: &Card) -> Option<Card> {
        let hand = self.hands.get_mut(player)?;
        let idx = hand.iter().position(|c| c.same_face(card))?;
        Some(hand.remove(idx))
    }

    fn take_from_slot(&mut self, player: &PlayerId, flag_index: usize, card: &Card) -> Option<Card> {
        let slot = self.board[flag_index].cards.get_mut(player)?;
        let idx = slot.iter().position(|c| c.same_face(card))?;
        Some(slot.remove(idx))
    }

    /// 炮台放满两张同色牌时开火：获得攻击权，并永久记录已开火
    fn arm_cannon(&mut self, player: PlayerId) {
        let cannon = self.cannon(&player);
        if cannon.len() == CANNON_SLOTS && cannon.windows(2).all(|w| w[0].color == w[1].color) {
            self.attack_privilege = Some(player);
            self.fired_cannons.insert(player, true);
            self.freeze = Freeze::Cannon;
            debug!(%player, "炮台开火，获得攻击权");
        }
    }

    /// 重新结算一面旗帜：派生字段、特殊能力触发、营地冻结解除
    ///
    /// 只有 `actor` (本次动作的执行者) 放满时才可能触发能力。
    pub(crate) fn resolve_flag(&mut self, flag_index: usize, actor: PlayerId) {
        let players = self.players.clone();
        let flag = &mut self.board[flag_index];
        flag.recompute(&players);
        if let Some((trigger, player)) = flag.take_trigger(&actor) {
            self.apply_trigger(flag_index, trigger, player);
        }

        // 对手也放满这面营地时，冻结立即解除
        if let Freeze::Encampment { flag_index: frozen, owner } = self.freeze {
            let flag = &self.board[frozen];
            if frozen == flag_index && players.iter().any(|p| *p != owner && flag.is_full(p)) {
                self.freeze = Freeze::None;
                debug!(flag_index, "营地冻结解除");
            }
        }
    }

    pub(crate) fn resolve_board(&mut self, actor: PlayerId) {
        for flag_index in 0..self.board.len() {
            self.resolve_flag(flag_index, actor);
        }
    }

    fn apply_trigger(&mut self, flag_index: usize, trigger: Trigger, player: PlayerId) {
        debug!(flag_index, ?trigger, %player, "旗帜能力触发");
        match trigger {
            Trigger::HandBoost => {
                *self.max_hand_size.entry(player).or_insert(0) += 1;
                self.draw_up_to_max(&player);
            }
            Trigger::Charge => {
                self.freeze = Freeze::Encampment { flag_index, owner: player };
            }
            Trigger::Stronghold => {
                if self.attack_privilege.is_none() {
                    self.attack_privilege = Some(player);
                }
            }
            Trigger::Citadel => {
                if !self.citadel_used {
                    self.citadel_used = true;
                    self.citadel_privilege = Some(player);
                }
            }
        }
    }
}

// --- 单元测试 ---
