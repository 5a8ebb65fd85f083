use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::error::MatchError;
use crate::formation::Category;
use crate::logic::{ActionResult, PlaceTarget};
use crate::state::{MatchState, PlayerId, Winner};

/// 机器人对手可以选择的动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotAction {
    Place { card: Card, target: PlaceTarget },
    Destroy { card: Card },
    Move { from_flag: usize, to_flag: usize, card: Card },
    Recall { flag_index: usize, card: Card },
}

impl BotAction {
    pub fn apply(&self, state: &mut MatchState, player: PlayerId) -> Result<ActionResult, MatchError> {
        match *self {
            BotAction::Place { card, target } => state.apply_place(player, card, target),
            BotAction::Destroy { card } => state.apply_destroy(player, card),
            BotAction::Move { from_flag, to_flag, card } => state.apply_move(player, from_flag, to_flag, card),
            BotAction::Recall { flag_index, card } => state.apply_recall(player, flag_index, card),
        }
    }
}

// 评估权重：已计分的旗帜远比未完成旗帜上的阵型优势重要
const WIN_SCORE: i64 = 100_000;
const FLAG_SCORE: i64 = 100;
const CATEGORY_WEIGHT: i64 = 10;
const ATTACK_BONUS: i64 = 30;
const CITADEL_BONUS: i64 = 20;

/// 列出玩家当前所有合法的动作
pub fn candidate_actions(state: &MatchState, player: &PlayerId) -> Vec<BotAction> {
    let mut actions = Vec::new();
    if state.game_over || state.ensure_player(player).is_err() {
        return actions;
    }

    // 持有攻击权时只能摧毁，目标是对手的牌
    if state.attack_privilege == Some(*player) {
        let board_cards = state.board.iter().flat_map(|f| f.cards.values().flatten());
        let cannon_cards = state.cannons.values().flatten();
        for card in board_cards.chain(cannon_cards) {
            if card.owner != Some(*player) {
                actions.push(BotAction::Destroy { card: *card });
            }
        }
        return actions;
    }

    if state.citadel_privilege == Some(*player) {
        for (from_flag, flag) in state.board.iter().enumerate() {
            for card in flag.slot(player) {
                actions.push(BotAction::Recall { flag_index: from_flag, card: *card });
                for to_flag in (0..state.board.len()).filter(|&to| to != from_flag) {
                    actions.push(BotAction::Move { from_flag, to_flag, card: *card });
                }
            }
        }
    }

    let targets: Vec<PlaceTarget> = (0..state.board.len())
        .map(PlaceTarget::Flag)
        .chain(std::iter::once(PlaceTarget::Cannon))
        .collect();
    for card in state.hand(player) {
        for target in &targets {
            if state.can_place(player, card, *target).unwrap_or(false) {
                actions.push(BotAction::Place { card: *card, target: *target });
            }
        }
    }

    actions
}

/// 站在 `player` 的角度评估局面，分数越高越好
pub fn evaluate_position(state: &MatchState, player: &PlayerId) -> i64 {
    if state.game_over {
        return match state.winner {
            Some(Winner::Player(id)) if id == *player => WIN_SCORE,
            Some(Winner::Player(_)) => -WIN_SCORE,
            _ => 0,
        };
    }

    let Some(opponent) = state.opponent_of(player) else {
        return 0;
    };
    let mine = state.scores.get(player).copied().unwrap_or(0) as i64;
    let theirs = state.scores.get(&opponent).copied().unwrap_or(0) as i64;
    let mut value = (mine - theirs) * FLAG_SCORE;

    // 未完成的旗帜：比较当前阵型的等级和最大点数
    for flag in state.board.iter().filter(|f| !f.is_complete()) {
        let a = flag.formation_of(player);
        let b = flag.formation_of(&opponent);
        value += (category_value(a.category) - category_value(b.category)) * CATEGORY_WEIGHT;
        value += a.tie_break.first().copied().unwrap_or(0) as i64 - b.tie_break.first().copied().unwrap_or(0) as i64;
    }

    if state.attack_privilege == Some(*player) {
        value += ATTACK_BONUS;
    }
    if state.citadel_privilege == Some(*player) {
        value += CITADEL_BONUS;
    }
    value
}

fn category_value(category: Category) -> i64 {
    category as u8 as i64
}

/// 为 `player` 推荐一个动作
///
/// 对每个候选动作在局面副本上模拟一步，选择评估最高的动作。
/// 不会修改传入的比赛状态。
pub fn suggest_action(state: &MatchState, player: &PlayerId) -> Option<BotAction> {
    candidate_actions(state, player)
        .into_iter()
        .filter_map(|action| {
            let mut sim = state.clone();
            let result = action.apply(&mut sim, *player).ok()?;
            result.accepted.then(|| (evaluate_position(&sim, player), action))
        })
        .max_by_key(|(value, _)| *value)
        .map(|(_, action)| action)
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Color::*;
    use crate::card::Color;
    use crate::state::MatchConfig;
    use uuid::Uuid;

    fn c(color: Color, rank: u8) -> Card {
        Card::new(color, rank)
    }

    fn owned(color: Color, rank: u8, owner: PlayerId) -> Card {
        Card { color, rank, owner: Some(owner) }
    }

    fn empty_match() -> (MatchState, PlayerId, PlayerId) {
        let (p0, p1) = (Uuid::new_v4(), Uuid::new_v4());
        let mut state = MatchState::create(&[p0, p1], MatchConfig::default()).unwrap();
        state.deck.clear();
        state.hands.insert(p0, Vec::new());
        state.hands.insert(p1, Vec::new());
        (state, p0, p1)
    }

    #[test]
    fn test_bot_completes_a_winning_flag() {
        let (mut state, bot, human) = empty_match();
        state.board[0].cards.insert(bot, vec![owned(Red, 7, bot)]);
        state.board[0].cards.insert(human, vec![owned(Blue, 9, human), owned(Blue, 2, human)]);
        state.hands.insert(bot, vec![c(Pink, 1), c(Green, 7)]);

        let action = suggest_action(&state, &bot).unwrap();
        assert_eq!(action, BotAction::Place { card: c(Green, 7), target: PlaceTarget::Flag(0) });
    }

    #[test]
    fn test_bot_spends_attack_on_opponent_card() {
        let (mut state, bot, human) = empty_match();
        state.board[0].cards.insert(bot, vec![owned(Red, 3, bot)]);
        state.board[0].cards.insert(human, vec![owned(Blue, 10, human)]);
        state.attack_privilege = Some(bot);

        let candidates = candidate_actions(&state, &bot);
        assert_eq!(candidates, vec![BotAction::Destroy { card: owned(Blue, 10, human) }]);

        let action = suggest_action(&state, &bot).unwrap();
        assert!(action.apply(&mut state, bot).unwrap().accepted);
        assert!(state.board[0].slot(&human).is_empty());
    }

    #[test]
    fn test_suggestion_does_not_mutate_state() {
        let (mut state, bot, _) = empty_match();
        state.hands.insert(bot, vec![c(Red, 1), c(Red, 2)]);
        let before = state.clone();
        assert!(suggest_action(&state, &bot).is_some());
        assert_eq!(state, before);
    }

    #[test]
    fn test_no_suggestion_when_nothing_is_legal() {
        let (mut state, bot, human) = empty_match();
        state.hands.insert(bot, vec![c(Red, 1)]);
        state.citadel_privilege = Some(human);
        assert_eq!(suggest_action(&state, &bot), None);

        state.citadel_privilege = None;
        state.game_over = true;
        assert!(candidate_actions(&state, &bot).is_empty());
    }

    #[test]
    fn test_citadel_holder_considers_moves() {
        let (mut state, bot, _) = empty_match();
        state.board[7].cards.insert(bot, vec![owned(Red, 4, bot)]);
        state.citadel_privilege = Some(bot);

        let candidates = candidate_actions(&state, &bot);
        assert!(candidates.contains(&BotAction::Recall { flag_index: 7, card: owned(Red, 4, bot) }));
        assert!(candidates.contains(&BotAction::Move { from_flag: 7, to_flag: 0, card: owned(Red, 4, bot) }));
        // 8 面目标旗帜 + 收回
        assert_eq!(candidates.len(), 9);
    }
}
