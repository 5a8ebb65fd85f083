use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;
use uuid::Uuid;

use flagfall_core::{Card, ClientMessage, Color, MatchState, PlaceTarget, PlayerId, ServerMessage, MAX_RANK, MIN_RANK};

const DEFAULT_URL: &str = "ws://127.0.0.1:25917/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let raw_url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLAGFALL_URL").ok())
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&raw_url)?;

    println!("正在连接到: {}", url);
    let (ws_stream, _) = connect_async(url.as_str()).await?;
    println!("连接成功!");

    let (mut write, mut read) = ws_stream.split();

    // 启动一个任务来处理从服务器接收的消息
    tokio::spawn(async move {
        let mut my_id: Option<PlayerId> = None;
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(server_msg) => {
                            if let ServerMessage::MatchStarted { your_id, .. } = &server_msg {
                                my_id = Some(*your_id);
                            }
                            println!("\n<-- {}", describe(&server_msg, my_id.as_ref()));
                            print!("> "); // 重新显示输入提示符
                            let _ = std::io::stdout().flush();
                        }
                        Err(e) => eprintln!("解析服务器消息失败: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("接收消息时出错: {}", e);
                    break;
                }
            }
        }
    });

    // 主任务处理用户输入
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    println!("--- 旗帜争夺客户端 ---");
    println!("可用命令:");
    println!("  queue <昵称>                        - 进入匹配队列");
    println!("  bot <昵称>                          - 与机器人对战");
    println!("  place <旗帜> <颜色> <点数>          - 放牌到旗帜");
    println!("  cannon <颜色> <点数>                - 放牌到炮台");
    println!("  destroy <颜色> <点数> <所有者ID>    - 使用攻击权摧毁一张牌");
    println!("  move <来源> <目标> <颜色> <点数>    - 使用城堡移动权移动一张牌");
    println!("  recall <旗帜> <颜色> <点数>         - 使用城堡移动权收回一张牌");
    println!("  restart                             - 重新开始比赛");
    println!("  exit                                - 退出");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let client_msg = match parse_command(&line) {
            Ok(Command::Send(msg)) => msg,
            Ok(Command::Exit) => {
                println!("正在断开连接...");
                break;
            }
            Ok(Command::Empty) => continue,
            Err(usage) => {
                println!("{}", usage);
                continue;
            }
        };

        let payload = serde_json::to_string(&client_msg)?;
        write.send(Message::Text(payload.into())).await?;
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(ClientMessage),
    Exit,
    Empty,
}

/// 解析一行用户输入，出错时返回提示信息
fn parse_command(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some(&command) = parts.first() else {
        return Ok(Command::Empty);
    };
    let args = &parts[1..];

    let msg = match command {
        "queue" => ClientMessage::JoinQueue { nickname: nickname(args) },
        "bot" => ClientMessage::PlayBot { nickname: nickname(args) },
        "place" => {
            let [flag, color, rank] = args else {
                return Err("用法: place <旗帜> <颜色> <点数>".to_string());
            };
            ClientMessage::PlaceCard { card: parse_card(color, rank)?, target: PlaceTarget::Flag(parse_index(flag)?) }
        }
        "cannon" => {
            let [color, rank] = args else {
                return Err("用法: cannon <颜色> <点数>".to_string());
            };
            ClientMessage::PlaceCard { card: parse_card(color, rank)?, target: PlaceTarget::Cannon }
        }
        "destroy" => {
            let [color, rank, owner] = args else {
                return Err("用法: destroy <颜色> <点数> <所有者ID>".to_string());
            };
            let owner: Uuid = owner.parse().map_err(|_| format!("无效的玩家ID: {}", owner))?;
            let card = Card { owner: Some(owner), ..parse_card(color, rank)? };
            ClientMessage::DestroyCard { card }
        }
        "move" => {
            let [from, to, color, rank] = args else {
                return Err("用法: move <来源> <目标> <颜色> <点数>".to_string());
            };
            ClientMessage::MoveCard {
                from_flag: parse_index(from)?,
                to_flag: parse_index(to)?,
                card: parse_card(color, rank)?,
            }
        }
        "recall" => {
            let [flag, color, rank] = args else {
                return Err("用法: recall <旗帜> <颜色> <点数>".to_string());
            };
            ClientMessage::RecallCard { flag_index: parse_index(flag)?, card: parse_card(color, rank)? }
        }
        "restart" => ClientMessage::RestartMatch,
        "exit" => return Ok(Command::Exit),
        _ => return Err(format!("未知命令: {}", line.trim())),
    };
    Ok(Command::Send(msg))
}

fn nickname(args: &[&str]) -> String {
    args.first().unwrap_or(&"新玩家").to_string()
}

fn parse_index(raw: &str) -> Result<usize, String> {
    raw.parse().map_err(|_| format!("无效的旗帜编号: {}", raw))
}

fn parse_card(color: &str, rank: &str) -> Result<Card, String> {
    let color: Color = color.parse()?;
    let rank: u8 = rank.parse().map_err(|_| format!("无效的点数: {}", rank))?;
    if !(MIN_RANK..=MAX_RANK).contains(&rank) {
        return Err(format!("点数必须在 {} 到 {} 之间", MIN_RANK, MAX_RANK));
    }
    Ok(Card::new(color, rank))
}

/// 把服务器消息转换为适合终端阅读的文本
fn describe(msg: &ServerMessage, me: Option<&PlayerId>) -> String {
    match msg {
        ServerMessage::Queued => "已进入匹配队列，等待对手...".to_string(),
        ServerMessage::MatchStarted { your_id, room_id, opponent, state } => format!(
            "比赛开始! 房间 {}，你的ID {}，对手 {}\n{}",
            room_id,
            your_id,
            opponent,
            render_state(state, Some(your_id))
        ),
        ServerMessage::StateUpdated(state) => render_state(state, me),
        ServerMessage::CardDestroyed { card } => format!("牌 {} 被摧毁", card),
        ServerMessage::GameOver { winner, scores } => {
            let mut lines = vec![format!("比赛结束! 胜者: {}", winner)];
            for (id, score) in scores {
                lines.push(format!("  {} : {} 面旗帜", id, score));
            }
            lines.join("\n")
        }
        ServerMessage::Rejected { message } => format!("动作被拒绝: {}", message),
        ServerMessage::OpponentDisconnected { player_id } => format!("对手 {} 断开连接，房间已关闭", player_id),
        ServerMessage::Info { message } => format!("[信息] {}", message),
        ServerMessage::Error { message } => format!("[错误] {}", message),
    }
}

fn render_state(state: &MatchState, me: Option<&PlayerId>) -> String {
    let mut lines = Vec::new();
    let opponent = me.and_then(|id| state.opponent_of(id));

    for (index, flag) in state.board.iter().enumerate() {
        let mine = me.map(|id| cards_text(flag.slot(id))).unwrap_or_default();
        let theirs = opponent.map(|id| cards_text(flag.slot(&id))).unwrap_or_default();
        let claimed = match flag.claimed_by {
            Some(id) if Some(&id) == me => " [你占领]",
            Some(_) => " [对手占领]",
            None => "",
        };
        lines.push(format!(
            "  {} {}({}) 你: [{}] 对手: [{}] {}{}",
            index, flag.kind, flag.capacity, mine, theirs, flag.best_formation, claimed
        ));
    }

    if let Some(id) = me {
        lines.push(format!("  炮台: [{}]", cards_text(state.cannon(id))));
        lines.push(format!("  手牌: [{}]", cards_text(state.hand(id))));
        let score = state.scores.get(id).copied().unwrap_or(0);
        let their_score = opponent.and_then(|o| state.scores.get(&o).copied()).unwrap_or(0);
        lines.push(format!("  比分: {} - {}，牌堆剩余 {}", score, their_score, state.deck.len()));
        if state.attack_privilege == Some(*id) {
            lines.push("  你持有攻击权，可以摧毁一张牌".to_string());
        }
        if state.citadel_privilege == Some(*id) {
            lines.push("  你持有城堡移动权，可以移动或收回一张牌".to_string());
        }
    }
    lines.join("\n")
}

fn cards_text(cards: &[Card]) -> String {
    cards.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_place_and_cannon() {
        assert_eq!(
            parse_command("place 3 red 7"),
            Ok(Command::Send(ClientMessage::PlaceCard {
                card: Card::new(Color::Red, 7),
                target: PlaceTarget::Flag(3)
            }))
        );
        assert_eq!(
            parse_command("  cannon Blue 10 "),
            Ok(Command::Send(ClientMessage::PlaceCard {
                card: Card::new(Color::Blue, 10),
                target: PlaceTarget::Cannon
            }))
        );
    }

    #[test]
    fn test_parse_destroy_keeps_owner() {
        let owner = Uuid::new_v4();
        let Ok(Command::Send(ClientMessage::DestroyCard { card })) = parse_command(&format!("destroy green 2 {}", owner))
        else {
            panic!("destroy 命令解析失败");
        };
        assert_eq!(card.owner, Some(owner));
        assert_eq!((card.color, card.rank), (Color::Green, 2));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("place 1 red").is_err());
        assert!(parse_command("place x red 4").is_err());
        assert!(parse_command("cannon red 11").is_err());
        assert!(parse_command("destroy red 4 nobody").is_err());
        assert!(parse_command("fold").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command(""), Ok(Command::Empty));
        assert_eq!(parse_command("exit"), Ok(Command::Exit));
        assert_eq!(parse_command("restart"), Ok(Command::Send(ClientMessage::RestartMatch)));
        assert_eq!(
            parse_command("bot"),
            Ok(Command::Send(ClientMessage::PlayBot { nickname: "新玩家".to_string() }))
        );
    }
}
