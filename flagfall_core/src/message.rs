use crate::bot::BotAction;
use crate::card::Card;
use crate::logic::PlaceTarget;
use crate::state::{MatchState, PlayerId, Winner};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type RoomId = Uuid;

// --- 客户端 -> 服务器 的消息 ---
// 这些是客户端可以发送给服务器的指令或动作。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    // --- 匹配消息 ---
    /// 进入匹配队列，等待另一名玩家
    JoinQueue { nickname: String },
    /// 与机器人对手开始一场比赛
    PlayBot { nickname: String },

    // --- 比赛内消息 ---
    /// 从手牌中打出一张牌到旗帜或炮台
    PlaceCard { card: Card, target: PlaceTarget },
    /// 使用攻击权摧毁一张已放置的牌，`card.owner` 必须与场上的牌一致
    DestroyCard { card: Card },
    /// 使用城堡移动权移动自己的一张牌
    MoveCard { from_flag: usize, to_flag: usize, card: Card },
    /// 使用城堡移动权把自己的一张牌收回手牌
    RecallCard { flag_index: usize, card: Card },
    /// 以同样的玩家重新开始一场比赛
    RestartMatch,
}

// --- 服务器 -> 客户端 的消息 ---
// 这些是服务器在比赛状态改变后，广播给房间内所有客户端的事件通知。

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// 已进入匹配队列
    Queued,

    /// 比赛开始，私密地发给每位玩家
    MatchStarted {
        your_id: PlayerId,
        room_id: RoomId,
        opponent: String,
        state: MatchState,
    },

    /// 每次动作被接受后广播的完整比赛快照
    StateUpdated(MatchState),

    /// 一张牌被攻击权摧毁
    CardDestroyed { card: Card },

    /// 比赛结束，每场比赛只发送一次
    GameOver {
        winner: Winner,
        scores: HashMap<PlayerId, u32>,
    },

    /// 动作不符合规则，状态没有改变
    Rejected { message: String },

    /// 对手断开连接，房间随后关闭
    OpponentDisconnected { player_id: PlayerId },

    Info { message: String },
    Error { message: String },
}

impl From<BotAction> for ClientMessage {
    fn from(action: BotAction) -> Self {
        match action {
            BotAction::Place { card, target } => ClientMessage::PlaceCard { card, target },
            BotAction::Destroy { card } => ClientMessage::DestroyCard { card },
            BotAction::Move { from_flag, to_flag, card } => ClientMessage::MoveCard { from_flag, to_flag, card },
            BotAction::Recall { flag_index, card } => ClientMessage::RecallCard { flag_index, card },
        }
    }
}

/// 比赛内的动作消息可以转换为统一的动作，其余消息原样返回
impl TryFrom<ClientMessage> for BotAction {
    type Error = ClientMessage;

    fn try_from(msg: ClientMessage) -> Result<Self, Self::Error> {
        match msg {
            ClientMessage::PlaceCard { card, target } => Ok(BotAction::Place { card, target }),
            ClientMessage::DestroyCard { card } => Ok(BotAction::Destroy { card }),
            ClientMessage::MoveCard { from_flag, to_flag, card } => Ok(BotAction::Move { from_flag, to_flag, card }),
            ClientMessage::RecallCard { flag_index, card } => Ok(BotAction::Recall { flag_index, card }),
            other => Err(other),
        }
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Color;

    #[test]
    fn test_client_message_json_shape() {
        let msg = ClientMessage::PlaceCard { card: Card::new(Color::Red, 4), target: PlaceTarget::Flag(2) };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with(r#"{"PlaceCard":"#));
        assert_eq!(serde_json::from_str::<ClientMessage>(&json).unwrap(), msg);

        let restart: ClientMessage = serde_json::from_str(r#""RestartMatch""#).unwrap();
        assert_eq!(restart, ClientMessage::RestartMatch);
    }

    #[test]
    fn test_bot_action_converts_to_client_message() {
        let card = Card::new(Color::Blue, 9);
        let msg: ClientMessage = BotAction::Recall { flag_index: 7, card }.into();
        assert_eq!(msg, ClientMessage::RecallCard { flag_index: 7, card });

        assert_eq!(BotAction::try_from(msg), Ok(BotAction::Recall { flag_index: 7, card }));
        assert_eq!(BotAction::try_from(ClientMessage::RestartMatch), Err(ClientMessage::RestartMatch));
    }
}
