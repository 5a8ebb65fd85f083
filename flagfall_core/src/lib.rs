//! # 旗帜争夺核心逻辑库
//!
//! 这个 `core` crate 包含了旗帜争夺游戏的所有核心状态管理、
//! 行动处理、阵型评估、机器人对手以及客户端-服务器通信消息的定义。
//! 它与具体实现（如网络服务器、终端客户端）解耦，
//! 对同一场比赛的调用需要由上层按顺序进行。

mod bot;
mod card;
mod error;
mod flag;
mod formation;
mod logic;
mod message;
mod state;

pub use bot::*;

pub use card::*;

pub use error::*;

pub use flag::*;

pub use formation::*;

pub use logic::*;

pub use message::*;

pub use state::*;
