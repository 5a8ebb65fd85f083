use crate::state::PlayerId;

/// 调用方的结构性错误
///
/// 与规则上的 "非法操作" 不同：非法操作只是被静默拒绝，
/// 而这些错误说明调用方 (例如传输层) 存在协议级的 bug。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("未知玩家: {0}")]
    UnknownPlayer(PlayerId),

    #[error("旗帜编号 {0} 不存在")]
    UnknownFlag(usize),

    #[error("一场比赛需要 2 名玩家，实际为 {0}")]
    PlayerCount(usize),

    #[error("玩家 {0} 重复出现")]
    DuplicatePlayer(PlayerId),

    #[error("初始手牌数必须在 3 到 5 之间，实际为 {0}")]
    HandSize(usize),
}
