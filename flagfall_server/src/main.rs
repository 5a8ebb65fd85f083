use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use parking_lot::Mutex as P_Mutex;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use flagfall_core::{
    candidate_actions, suggest_action, BotAction, ClientMessage, GameOutcome, MatchError, MatchState, PlayerId, RoomId, ServerMessage,
    Winner,
};

mod config;

use config::{ConfigError, ServerConfig};

const BOT_NICKNAME: &str = "机器人";
// 一次人类动作之后，机器人最多连续行动的次数
const MAX_BOT_STEPS: usize = 64;

// 服务器全局状态
struct AppState {
    rooms: DashMap<RoomId, Arc<Room>>,
    // 玩家当前所在的房间
    player_rooms: DashMap<PlayerId, RoomId>,
    // 匹配队列中等待的玩家，最多一人
    waiting: P_Mutex<Option<Seat>>,
    config: ServerConfig,
}

// 单个房间 (一场比赛) 的状态
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// players -> match_state，并且持有 match_state 时不能 await
struct Room {
    id: RoomId,
    match_state: P_Mutex<MatchState>,
    // 将 PlayerId 映射到具体的网络连接，机器人没有连接
    players: RwLock<HashMap<PlayerId, PlayerConnection>>,
    nicknames: HashMap<PlayerId, String>,
    bot_id: Option<PlayerId>,
}

// 玩家的网络连接信息
struct PlayerConnection {
    // 用于向该玩家的 WebSocket 任务发送消息的通道
    sender: mpsc::Sender<ServerMessage>,
}

// 入座一场比赛的参与者
struct Seat {
    player_id: PlayerId,
    nickname: String,
    sender: Option<mpsc::Sender<ServerMessage>>,
}

type SharedState = Arc<AppState>;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("网络错误: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.addr;

    let state = SharedState::new(AppState {
        rooms: DashMap::new(),
        player_rooms: DashMap::new(),
        waiting: P_Mutex::new(None),
        config,
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("服务器正在监听 {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 创建一个 MPSC 通道，用于从其他任务接收要发送的消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 当前连接的玩家身份，第一次进入匹配时分配
    let mut player_context: Option<PlayerId> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, &state, &tx, &mut player_context).await;
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some(player_id) = player_context {
        handle_disconnect(&state, player_id).await;
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<PlayerId>,
) {
    let msg = match BotAction::try_from(msg) {
        Ok(action) => return handle_action(action, state, tx, context).await,
        Err(msg) => msg,
    };

    match msg {
        ClientMessage::JoinQueue { nickname } => {
            let player_id = *context.get_or_insert_with(Uuid::new_v4);
            if is_busy(state, &player_id) {
                send_error(tx, "你已经在队列或比赛中了").await;
                return;
            }

            let opponent = {
                let mut waiting = state.waiting.lock();
                match waiting.take() {
                    Some(seat) if seat.sender.as_ref().is_some_and(|s| !s.is_closed()) => Some(seat),
                    _ => {
                        *waiting = Some(Seat { player_id, nickname: nickname.clone(), sender: Some(tx.clone()) });
                        None
                    }
                }
            };

            match opponent {
                None => {
                    info!("玩家 {} 进入匹配队列", player_id);
                    let _ = tx.send(ServerMessage::Queued).await;
                }
                Some(seat) => {
                    let me = Seat { player_id, nickname, sender: Some(tx.clone()) };
                    if let Err(e) = start_match(state, vec![seat, me], None).await {
                        send_error(tx, &e.to_string()).await;
                    }
                }
            }
        }
        ClientMessage::PlayBot { nickname } => {
            let player_id = *context.get_or_insert_with(Uuid::new_v4);
            if is_busy(state, &player_id) {
                send_error(tx, "你已经在队列或比赛中了").await;
                return;
            }

            let bot_id = Uuid::new_v4();
            let seats = vec![
                Seat { player_id, nickname, sender: Some(tx.clone()) },
                Seat { player_id: bot_id, nickname: BOT_NICKNAME.to_string(), sender: None },
            ];
            if let Err(e) = start_match(state, seats, Some(bot_id)).await {
                send_error(tx, &e.to_string()).await;
            }
        }
        ClientMessage::RestartMatch => {
            let Some((player_id, room)) = current_room(state, context) else {
                send_error(tx, "请先加入一场比赛").await;
                return;
            };

            let ids = room.match_state.lock().players.clone();
            match MatchState::create(&ids, state.config.match_config) {
                Ok(fresh) => {
                    *room.match_state.lock() = fresh;
                    info!("玩家 {} 重新开始了房间 {} 的比赛", player_id, room.id);
                    announce_match(&room).await;
                }
                Err(e) => send_error(tx, &e.to_string()).await,
            }
        }
        // 动作消息已经在上面处理
        _ => {}
    }
}

/// 处理比赛内的动作：放牌、摧毁、移动、收回
async fn handle_action(
    action: BotAction,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &Option<PlayerId>,
) {
    let Some((player_id, room)) = current_room(state, context) else {
        send_error(tx, "请先加入一场比赛").await;
        return;
    };

    let outcome = {
        let mut match_state = room.match_state.lock();
        match run_action(&mut match_state, player_id, &action) {
            Ok(Some(mut messages)) => {
                if let Some(bot_id) = room.bot_id {
                    messages.extend(run_bot(&mut match_state, bot_id));
                }
                Ok(Some(messages))
            }
            other => other,
        }
    };

    match outcome {
        Ok(Some(messages)) => {
            let r_players = room.players.read().await;
            for msg in &messages {
                broadcast(r_players.iter(), msg, None).await;
            }
        }
        Ok(None) => {
            let _ = tx.send(ServerMessage::Rejected { message: "该动作不符合规则".to_string() }).await;
        }
        Err(e) => {
            warn!("玩家 {} 的动作出错: {}", player_id, e);
            send_error(tx, &e.to_string()).await;
        }
    }
}

/// 执行一个动作并生成需要广播的消息；动作被规则拒绝时返回 None
fn run_action(
    match_state: &mut MatchState,
    player_id: PlayerId,
    action: &BotAction,
) -> Result<Option<Vec<ServerMessage>>, MatchError> {
    let result = action.apply(match_state, player_id)?;
    if !result.accepted {
        return Ok(None);
    }

    let mut messages = Vec::new();
    if let BotAction::Destroy { card } = action {
        messages.push(ServerMessage::CardDestroyed { card: *card });
    }
    messages.push(ServerMessage::StateUpdated(match_state.clone()));
    if let Some(outcome) = result.finished {
        messages.push(game_over_message(outcome));
    }
    Ok(Some(messages))
}

/// 让机器人对手行动
///
/// 机器人持有攻击权或城堡移动权时，或者对手 (人类玩家) 没有任何合法动作时，
/// 机器人会继续行动，直到没有被接受的动作为止。
fn run_bot(match_state: &mut MatchState, bot_id: PlayerId) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    for _ in 0..MAX_BOT_STEPS {
        if match_state.game_over {
            break;
        }
        let Some(action) = suggest_action(match_state, &bot_id) else {
            break;
        };
        debug!(?action, "机器人行动");
        match run_action(match_state, bot_id, &action) {
            Ok(Some(step)) => messages.extend(step),
            Ok(None) => break,
            Err(e) => {
                warn!("机器人动作出错: {}", e);
                break;
            }
        }

        let holds_privilege =
            match_state.attack_privilege == Some(bot_id) || match_state.citadel_privilege == Some(bot_id);
        let human_stuck = match_state
            .opponent_of(&bot_id)
            .is_some_and(|human| candidate_actions(match_state, &human).is_empty());
        if !holds_privilege && !human_stuck {
            break;
        }
    }
    messages
}

fn game_over_message(outcome: GameOutcome) -> ServerMessage {
    ServerMessage::GameOver {
        winner: outcome.winner.unwrap_or(Winner::Tie),
        scores: outcome.scores,
    }
}

/// 为入座的玩家创建房间和比赛，并通知每位玩家
async fn start_match(state: &SharedState, seats: Vec<Seat>, bot_id: Option<PlayerId>) -> Result<(), MatchError> {
    let ids: Vec<PlayerId> = seats.iter().map(|s| s.player_id).collect();
    let match_state = MatchState::create(&ids, state.config.match_config)?;

    let room_id = Uuid::new_v4();
    let nicknames = seats.iter().map(|s| (s.player_id, s.nickname.clone())).collect();
    let connections: HashMap<PlayerId, PlayerConnection> = seats
        .into_iter()
        .filter_map(|s| Some((s.player_id, PlayerConnection { sender: s.sender? })))
        .collect();
    for player_id in connections.keys() {
        state.player_rooms.insert(*player_id, room_id);
    }

    let room = Arc::new(Room {
        id: room_id,
        match_state: P_Mutex::new(match_state),
        players: RwLock::new(connections),
        nicknames,
        bot_id,
    });
    state.rooms.insert(room_id, room.clone());

    info!("房间 {} 开始比赛，玩家: {:?}", room_id, ids);
    announce_match(&room).await;
    Ok(())
}

/// 私密地向房间内每位玩家发送比赛开始消息
async fn announce_match(room: &Room) {
    let snapshot = room.match_state.lock().clone();
    for (player_id, conn) in room.players.read().await.iter() {
        let opponent = snapshot
            .opponent_of(player_id)
            .and_then(|id| room.nicknames.get(&id))
            .cloned()
            .unwrap_or_default();
        let msg = ServerMessage::MatchStarted {
            your_id: *player_id,
            room_id: room.id,
            opponent,
            state: snapshot.clone(),
        };
        if conn.sender.send(msg).await.is_err() {
            warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
        }
    }
}

fn current_room(state: &SharedState, context: &Option<PlayerId>) -> Option<(PlayerId, Arc<Room>)> {
    let player_id = (*context)?;
    let room_id = *state.player_rooms.get(&player_id)?;
    let room = state.rooms.get(&room_id)?.value().clone();
    Some((player_id, room))
}

fn is_busy(state: &SharedState, player_id: &PlayerId) -> bool {
    state.player_rooms.contains_key(player_id)
        || state.waiting.lock().as_ref().is_some_and(|seat| seat.player_id == *player_id)
}

async fn send_error(tx: &mpsc::Sender<ServerMessage>, message: &str) {
    let _ = tx.send(ServerMessage::Error { message: message.to_string() }).await;
}

/// 玩家断开连接后的处理：离开队列，或者关闭所在的房间
async fn handle_disconnect(state: &SharedState, player_id: PlayerId) {
    {
        let mut waiting = state.waiting.lock();
        if waiting.as_ref().is_some_and(|seat| seat.player_id == player_id) {
            *waiting = None;
            info!("玩家 {} 离开了匹配队列", player_id);
        }
    }

    let Some((_, room_id)) = state.player_rooms.remove(&player_id) else {
        return;
    };
    let Some((_, room)) = state.rooms.remove(&room_id) else {
        return;
    };
    info!("玩家 {} 从房间 {} 断开连接，房间已关闭", player_id, room_id);

    let mut r_players = room.players.write().await;
    r_players.remove(&player_id);
    for other in r_players.keys() {
        state.player_rooms.remove(other);
    }
    broadcast(r_players.iter(), &ServerMessage::OpponentDisconnected { player_id }, None).await;
}

/// 向房间内所有玩家广播消息
async fn broadcast(
    players: impl Iterator<Item = (&PlayerId, &PlayerConnection)>,
    message: &ServerMessage,
    exclude: Option<PlayerId>,
) {
    for (player_id, conn) in players {
        if Some(*player_id) == exclude {
            continue;
        }
        if conn.sender.send(message.clone()).await.is_err() {
            // 发送失败，说明该玩家也断开了，后续由其自己的 handle_socket 任务处理
            warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
        }
    }
}
