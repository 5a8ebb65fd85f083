use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::card::Card;
use crate::formation::{self, Formation};
use crate::state::PlayerId;

/// 旗帜种类，每种旗帜有自己的特殊能力
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum FlagKind {
    Outpost,
    Garrison,
    Encampment,
    Stronghold,
    Citadel,
}

/// 旗帜特殊能力的触发标识，每面旗帜上每种触发最多发生一次
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Trigger {
    /// 驻军：手牌上限 +1
    HandBoost,
    /// 营地：冲锋冻结
    Charge,
    /// 要塞：获得攻击权
    Stronghold,
    /// 城堡：获得移动权
    Citadel,
}

impl FlagKind {
    /// 玩家在该旗帜上放满牌时触发的能力
    pub fn trigger(&self) -> Option<Trigger> {
        match self {
            FlagKind::Outpost => None,
            FlagKind::Garrison => Some(Trigger::HandBoost),
            FlagKind::Encampment => Some(Trigger::Charge),
            FlagKind::Stronghold => Some(Trigger::Stronghold),
            FlagKind::Citadel => Some(Trigger::Citadel),
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            FlagKind::Outpost => "Outpost",
            FlagKind::Garrison => "Garrison",
            FlagKind::Encampment => "Encampment",
            FlagKind::Stronghold => "Stronghold",
            FlagKind::Citadel => "Citadel",
        })
    }
}

/// 旧版求和计分方式使用的派生数值，仅供展示，不参与正式计分
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct FlagBonuses {
    /// 每个玩家槽位中出现至少两次的颜色，每种 +2
    pub garrison_bonus: u32,
    /// 每个玩家面对的对手牌数之和
    pub encampment_penalty: u32,
    /// 第一个放满该旗帜的玩家
    pub stronghold_owner: Option<PlayerId>,
}

/// 一面旗帜 (Flag)
///
/// 牌槽只由行动处理器修改，其余字段都由 [`Flag::recompute`] 重新计算。
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub kind: FlagKind,
    pub capacity: usize,
    pub cards: HashMap<PlayerId, Vec<Card>>,
    pub claimed_by: Option<PlayerId>,
    pub best_formation: String,
    pub bonuses: FlagBonuses,
    pub fired: BTreeSet<Trigger>,
    pub charge_owner: Option<PlayerId>,
}

impl Flag {
    pub fn new(kind: FlagKind, capacity: usize, players: &[PlayerId]) -> Flag {
        Flag {
            kind,
            capacity,
            cards: players.iter().map(|id| (*id, Vec::new())).collect(),
            claimed_by: None,
            best_formation: String::new(),
            bonuses: FlagBonuses::default(),
            fired: BTreeSet::new(),
            charge_owner: None,
        }
    }

    pub fn slot(&self, player: &PlayerId) -> &[Card] {
        self.cards.get(player).map_or(&[], |cards| cards.as_slice())
    }

    pub fn is_full(&self, player: &PlayerId) -> bool {
        self.slot(player).len() >= self.capacity
    }

    /// 所有参与玩家都放满时，旗帜才算完成
    pub fn is_complete(&self) -> bool {
        self.cards.values().all(|cards| cards.len() >= self.capacity)
    }

    pub fn formation_of(&self, player: &PlayerId) -> Formation {
        formation::evaluate_formation(self.slot(player), self.capacity)
    }

    /// 重新计算占领者、最佳阵型名称和旧版计分数值
    ///
    /// `players` 决定遍历顺序，保证 "第一个放满的玩家" 是确定的。
    pub fn recompute(&mut self, players: &[PlayerId]) {
        let mut best: Option<(PlayerId, Formation)> = None;
        let mut tied = false;
        for player in players {
            let formation = self.formation_of(player);
            match best.as_ref().map(|(_, top)| formation.compare(top)) {
                None | Some(Ordering::Greater) => {
                    best = Some((*player, formation));
                    tied = false;
                }
                Some(Ordering::Equal) => tied = true,
                Some(Ordering::Less) => {}
            }
        }

        match best {
            Some((player, formation)) => {
                self.claimed_by = if tied || formation == Formation::NONE { None } else { Some(player) };
                self.best_formation = if formation == Formation::NONE { String::new() } else { formation.to_string() };
            }
            None => {
                self.claimed_by = None;
                self.best_formation.clear();
            }
        }

        let mut bonuses = FlagBonuses::default();
        for player in players {
            let cards = self.slot(player);

            let mut color_counts: HashMap<_, u32> = HashMap::new();
            for card in cards {
                *color_counts.entry(card.color).or_insert(0) += 1;
            }
            bonuses.garrison_bonus += 2 * color_counts.values().filter(|&&n| n >= 2).count() as u32;

            bonuses.encampment_penalty += players
                .iter()
                .filter(|other| *other != player)
                .map(|other| self.slot(other).len() as u32)
                .sum::<u32>();

            if bonuses.stronghold_owner.is_none() && cards.len() >= self.capacity {
                bonuses.stronghold_owner = Some(*player);
            }
        }
        self.bonuses = bonuses;
    }

    /// `actor` 刚刚放满这面旗帜时，取出尚未触发过的能力并将其标记为已触发
    ///
    /// 每种触发在一面旗帜上只会返回一次，即使之后牌被摧毁后再次放满。
    pub fn take_trigger(&mut self, actor: &PlayerId) -> Option<(Trigger, PlayerId)> {
        let trigger = self.kind.trigger()?;
        if self.fired.contains(&trigger) || !self.is_full(actor) {
            return None;
        }
        self.fired.insert(trigger);
        if trigger == Trigger::Charge {
            self.charge_owner = Some(*actor);
        }
        Some((trigger, *actor))
    }

    /// 按身份 (颜色, 点数, 所有者) 移除一张牌
    pub fn remove_card(&mut self, card: &Card) -> Option<Card> {
        self.cards.values_mut().find_map(|cards| {
            let idx = cards.iter().position(|c| c == card)?;
            Some(cards.remove(idx))
        })
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Color::*;
    use crate::card::{Card, Color};
    use uuid::Uuid;

    fn placed(color: Color, rank: u8, owner: PlayerId) -> Card {
        Card { color, rank, owner: Some(owner) }
    }

    fn setup(kind: FlagKind, capacity: usize) -> (Flag, Vec<PlayerId>) {
        let players = vec![Uuid::new_v4(), Uuid::new_v4()];
        (Flag::new(kind, capacity, &players), players)
    }

    #[test]
    fn test_claimed_by_best_formation() {
        let (mut flag, p) = setup(FlagKind::Outpost, 2);
        flag.cards.get_mut(&p[0]).unwrap().extend([placed(Red, 3, p[0]), placed(Blue, 3, p[0])]);
        flag.cards.get_mut(&p[1]).unwrap().extend([placed(Red, 9, p[1]), placed(Blue, 1, p[1])]);
        flag.recompute(&p);
        assert_eq!(flag.claimed_by, Some(p[0]));
        assert_eq!(flag.best_formation, "Pair");
        assert!(flag.is_complete());
    }

    #[test]
    fn test_tie_leaves_flag_unclaimed() {
        let (mut flag, p) = setup(FlagKind::Outpost, 2);
        flag.cards.get_mut(&p[0]).unwrap().extend([placed(Red, 9, p[0]), placed(Blue, 2, p[0])]);
        flag.cards.get_mut(&p[1]).unwrap().extend([placed(Green, 9, p[1]), placed(Pink, 2, p[1])]);
        flag.recompute(&p);
        assert_eq!(flag.claimed_by, None);
        assert_eq!(flag.best_formation, "High Card");
    }

    #[test]
    fn test_empty_flag_is_unclaimed() {
        let (mut flag, p) = setup(FlagKind::Garrison, 3);
        flag.recompute(&p);
        assert_eq!(flag.claimed_by, None);
        assert!(flag.best_formation.is_empty());
        assert!(!flag.is_complete());
    }

    #[test]
    fn test_legacy_bonuses() {
        let (mut flag, p) = setup(FlagKind::Garrison, 3);
        flag.cards.get_mut(&p[0]).unwrap().extend([placed(Red, 1, p[0]), placed(Red, 2, p[0]), placed(Blue, 3, p[0])]);
        flag.cards.get_mut(&p[1]).unwrap().push(placed(Green, 4, p[1]));
        flag.recompute(&p);
        assert_eq!(flag.bonuses.garrison_bonus, 2);
        // p0 面对 1 张对手牌，p1 面对 3 张
        assert_eq!(flag.bonuses.encampment_penalty, 4);
        assert_eq!(flag.bonuses.stronghold_owner, Some(p[0]));
    }

    #[test]
    fn test_trigger_fires_once_per_flag() {
        let (mut flag, p) = setup(FlagKind::Encampment, 3);
        assert_eq!(flag.take_trigger(&p[1]), None);
        flag.cards.get_mut(&p[1]).unwrap().extend([placed(Red, 1, p[1]), placed(Red, 2, p[1]), placed(Red, 3, p[1])]);
        assert_eq!(flag.take_trigger(&p[1]), Some((Trigger::Charge, p[1])));
        assert_eq!(flag.charge_owner, Some(p[1]));

        flag.cards.get_mut(&p[0]).unwrap().extend([placed(Blue, 1, p[0]), placed(Blue, 2, p[0]), placed(Blue, 3, p[0])]);
        assert_eq!(flag.take_trigger(&p[0]), None);
    }

    #[test]
    fn test_trigger_goes_to_the_acting_player() {
        let (mut flag, p) = setup(FlagKind::Stronghold, 2);
        flag.cards.get_mut(&p[0]).unwrap().extend([placed(Red, 1, p[0]), placed(Red, 2, p[0])]);
        // p1 还没放满，即使 p0 已经放满也不会替 p1 触发
        assert_eq!(flag.take_trigger(&p[1]), None);
        assert!(flag.fired.is_empty());
        assert_eq!(flag.take_trigger(&p[0]), Some((Trigger::Stronghold, p[0])));
    }

    #[test]
    fn test_outpost_has_no_trigger() {
        let (mut flag, p) = setup(FlagKind::Outpost, 2);
        flag.cards.get_mut(&p[0]).unwrap().extend([placed(Red, 1, p[0]), placed(Red, 2, p[0])]);
        assert_eq!(flag.take_trigger(&p[0]), None);
        assert!(flag.fired.is_empty());
    }

    #[test]
    fn test_remove_card_matches_owner() {
        let (mut flag, p) = setup(FlagKind::Outpost, 2);
        flag.cards.get_mut(&p[0]).unwrap().push(placed(Red, 5, p[0]));
        assert_eq!(flag.remove_card(&placed(Red, 5, p[1])), None);
        assert_eq!(flag.remove_card(&placed(Red, 5, p[0])), Some(placed(Red, 5, p[0])));
        assert!(flag.slot(&p[0]).is_empty());
    }
}
