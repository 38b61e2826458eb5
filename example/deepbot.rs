//! deepbot app: landing page, two chat views, topic graph, about, debug.
//! - `/chat` talks through the `llm` client binding, `/chat-fetch` through raw http.
//! - both share one dispatcher; each keeps its own conversation.
//! - the credential comes from `OPENROUTER_API_KEY` (native) or
//!   `localStorage["deepbot.api_key"]` (wasm). without it, chats answer with
//!   a configuration hint instead of failing.
//!
//! keys: type into the focused field, enter submits, backspace deletes.

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use deepbot::diagnostics::CredentialReport;
use deepbot::view;
use deepbot::{
    ChatSession, CurrentRoute, DeepBotConfig, DeepBotPlugin, FETCH_TRANSPORT, GraphBrowser, ProbeStatus,
    Route, RunProbe, Transports, send_user_text,
};

const HOME_COPY: &str = "DeepBot\n\
Your AI knowledge assistant.\n\n\
AI Chat Interface: ask questions and get answers from an OpenRouter-hosted model.\n\
Knowledge Graphs: browse the topics DeepBot knows about.\n\
Document Processing: coming later.\n\n\
Ready to get started? Open Chat.";

const ABOUT_COPY: &str = "About DeepBot\n\n\
DeepBot is a chat front-end for OpenRouter-compatible models with a small topic browser.\n\n\
How it works:\n\
1. Type a question in Chat; the whole conversation is sent with a fixed system prompt.\n\
2. The reply (or a short explanation of what went wrong) is appended to the log.\n\
3. Knowledge Graph filters a fixed set of topics by name.\n\n\
Configure the API key with OPENROUTER_API_KEY, the gateway with DEEPBOT_BASE_URL\n\
and the model with DEEPBOT_MODEL.";

const CHAT_GREETING: &str =
    "Hello! I'm DeepBot, your AI knowledge assistant powered by OpenRouter. How can I help you today?";
const FETCH_GREETING: &str = "Hello! I'm DeepBot, your AI knowledge assistant. How can I help you today?";

const BTN_IDLE: Color = Color::srgb(0.2, 0.2, 0.25);
const BTN_HOVER: Color = Color::srgb(0.25, 0.25, 0.3);
const BTN_PRESSED: Color = Color::srgb(0.3, 0.3, 0.35);
const BTN_DISABLED: Color = Color::srgb(0.12, 0.12, 0.14);
const BTN_SELECTED: Color = Color::srgb(0.22, 0.32, 0.5);
const MUTED: Color = Color::srgb(0.78, 0.78, 0.78);

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct PageRoot;
#[derive(Component, Copy, Clone)]
struct NavButton(Route);

#[derive(Component, Copy, Clone)]
struct TranscriptText(Entity);
#[derive(Component, Copy, Clone)]
struct PromptText(Entity);
#[derive(Component, Copy, Clone)]
struct BtnSend(Entity);

#[derive(Component)]
struct SearchText;
#[derive(Component)]
struct CardList;
#[derive(Component, Copy, Clone)]
struct NodeCard(u32);
#[derive(Component)]
struct SelectedText;
#[derive(Component)]
struct ExportText;
#[derive(Component)]
struct BtnRefresh;
#[derive(Component)]
struct BtnExport;

#[derive(Component)]
struct ProbeText;
#[derive(Component)]
struct BtnProbe;

/// the two chat session entities, spawned once and kept across page switches.
#[derive(Resource, Clone, Copy)]
struct Sessions {
    chat: Entity,
    chat_fetch: Entity,
}

impl Sessions {
    fn for_route(&self, route: Route) -> Option<Entity> {
        match route {
            Route::Chat => Some(self.chat),
            Route::ChatFetch => Some(self.chat_fetch),
            _ => None,
        }
    }
}

/// unsent chat input, shared by whichever chat page is showing.
#[derive(Resource, Default)]
struct Draft(String);

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let config = DeepBotConfig::from_env();
    let transports = Transports::from_config(&config);

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(config)
        .insert_resource(transports)
        .insert_resource(CurrentRoute(Route::initial()))
        .insert_resource(Draft::default())
        .insert_resource(GraphBrowser::default())
        .add_plugins(DefaultPlugins)
        .add_plugins(DeepBotPlugin)
        .add_systems(Startup, setup)
        .add_systems(
            Update,
            (
                handle_text_input,
                button_colors,
                btn_nav,
                btn_send,
                btn_refresh,
                btn_export,
                btn_node,
                btn_probe,
                rebuild_page,
            ),
        )
        // text refresh reads what the plugin just folded in
        .add_systems(
            Update,
            (
                refresh_transcripts,
                refresh_prompt,
                style_send_buttons,
                refresh_search,
                rebuild_cards,
                refresh_selection,
                refresh_probe,
            )
                .after(deepbot::ChatSet::Drain),
        )
        .run();
}

// ---------------------- setup ----------------------

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d::default());

    let chat = commands.spawn(ChatSession::new(None, CHAT_GREETING)).id();
    let chat_fetch = commands
        .spawn(ChatSession::new(Some(FETCH_TRANSPORT), FETCH_GREETING))
        .id();
    commands.insert_resource(Sessions { chat, chat_fetch });

    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            // --- nav bar ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Auto,
                    column_gap: Val::Px(8.0),
                    flex_direction: FlexDirection::Row,
                    padding: UiRect::all(Val::Px(8.0)),
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
            ))
            .with_children(|row| {
                for route in Route::ALL {
                    button(row, route.title(), NavButton(route), Val::Auto);
                }
            });

            // --- page content, rebuilt on route change ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Percent(100.0),
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(8.0),
                    padding: UiRect::axes(Val::Px(8.0), Val::Px(12.0)),
                    ..default()
                },
                BackgroundColor(Color::NONE),
                PageRoot,
            ));
        });
}

fn label(p: &mut ChildSpawnerCommands, text: impl Into<String>, size: f32, color: Color) {
    p.spawn((
        Text::new(text),
        TextFont { font_size: size, ..default() },
        TextColor(color),
    ));
}

fn button<M: Component>(p: &mut ChildSpawnerCommands, text: &str, marker: M, width: Val) {
    p.spawn((
        Button,
        Node {
            width,
            height: Val::Px(28.0),
            padding: UiRect::axes(Val::Px(10.0), Val::Px(0.0)),
            align_items: AlignItems::Center,
            justify_content: JustifyContent::Center,
            ..default()
        },
        BackgroundColor(BTN_IDLE),
        marker,
    ))
    .with_children(|b| {
        b.spawn((
            Text::new(text),
            TextFont { font_size: 14.0, ..default() },
            TextColor(Color::WHITE),
        ));
    });
}

fn row_node() -> Node {
    Node {
        width: Val::Percent(100.0),
        height: Val::Auto,
        column_gap: Val::Px(8.0),
        flex_direction: FlexDirection::Row,
        ..default()
    }
}

// ---------------------- pages ----------------------

fn rebuild_page(
    mut commands: Commands,
    route: Res<CurrentRoute>,
    sessions: Res<Sessions>,
    config: Res<DeepBotConfig>,
    q_root: Query<Entity, With<PageRoot>>,
    mut draft: ResMut<Draft>,
) {
    if !route.is_changed() {
        return;
    }
    let Ok(root) = q_root.single() else {
        return;
    };
    info!(target: "deepbot", "route -> {}", route.0.path());
    draft.0.clear();

    commands.entity(root).despawn_related::<Children>();
    commands.entity(root).with_children(|p| match route.0 {
        Route::Home => label(p, HOME_COPY, 18.0, Color::WHITE),
        Route::About => label(p, ABOUT_COPY, 16.0, Color::WHITE),
        Route::Chat | Route::ChatFetch => {
            let Some(session) = sessions.for_route(route.0) else {
                return;
            };
            let heading = if route.0 == Route::Chat {
                "Chat with DeepBot"
            } else {
                "Chat with DeepBot (Fetch API)"
            };
            label(p, heading, 22.0, Color::WHITE);
            label(p, "Ask questions and get AI-powered responses", 14.0, MUTED);
            p.spawn((
                Text::new(""),
                TextFont { font_size: 16.0, ..default() },
                TextColor(Color::WHITE),
                TranscriptText(session),
            ));
            p.spawn((row_node(), BackgroundColor(Color::NONE))).with_children(|row| {
                row.spawn((
                    Text::new("> "),
                    TextFont { font_size: 16.0, ..default() },
                    TextColor(Color::WHITE),
                    PromptText(session),
                ));
                button(row, "Send", BtnSend(session), Val::Px(80.0));
                button(row, "View Graph", NavButton(Route::Graph), Val::Auto);
            });
        }
        Route::Graph => {
            label(p, "Knowledge Graph", 22.0, Color::WHITE);
            label(p, "Explore the relationships in your knowledge base", 14.0, MUTED);
            p.spawn((row_node(), BackgroundColor(Color::NONE))).with_children(|row| {
                row.spawn((
                    Text::new(""),
                    TextFont { font_size: 16.0, ..default() },
                    TextColor(Color::WHITE),
                    SearchText,
                ));
                button(row, "Refresh Graph", BtnRefresh, Val::Auto);
                button(row, "Export", BtnExport, Val::Auto);
            });
            p.spawn((
                Node { flex_wrap: FlexWrap::Wrap, ..row_node() },
                BackgroundColor(Color::NONE),
                CardList,
            ));
            p.spawn((
                Text::new(""),
                TextFont { font_size: 14.0, ..default() },
                TextColor(MUTED),
                SelectedText,
            ));
            p.spawn((
                Text::new(""),
                TextFont { font_size: 12.0, ..default() },
                TextColor(MUTED),
                ExportText,
            ));
        }
        Route::Debug => {
            label(p, "OpenRouter Debug Panel", 22.0, Color::WHITE);
            label(p, "Environment:", 16.0, MUTED);
            label(p, CredentialReport::from_config(&config).to_string(), 16.0, Color::WHITE);
            label(p, format!("Model: {}\nEndpoint: {}", config.chat.model, config.completions_url()), 14.0, MUTED);
            button(p, "Test API Connection", BtnProbe, Val::Px(200.0));
            p.spawn((
                Text::new("No test run yet"),
                TextFont { font_size: 16.0, ..default() },
                TextColor(Color::WHITE),
                ProbeText,
            ));
        }
    });
}

// ---------------------- input & buttons ----------------------

fn submit_draft(commands: &mut Commands, session: Entity, state: &ChatSession, draft: &mut Draft) {
    // disabled control: nothing leaves the input while a reply is pending
    if !state.state.can_submit(&draft.0) {
        return;
    }
    let msg = std::mem::take(&mut draft.0);
    send_user_text(commands, session, msg);
}

fn handle_text_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    route: Res<CurrentRoute>,
    sessions: Res<Sessions>,
    q_sessions: Query<&ChatSession>,
    mut draft: ResMut<Draft>,
    mut graph: ResMut<GraphBrowser>,
) {
    let typed: String = ev_kbd
        .read()
        .filter(|ev| ev.state.is_pressed())
        .filter_map(|ev| ev.text.as_ref())
        .flat_map(|t| t.chars())
        .filter(|c| !c.is_control())
        .collect();

    match route.0 {
        Route::Chat | Route::ChatFetch => {
            let Some(e) = sessions.for_route(route.0) else {
                return;
            };
            let Ok(session) = q_sessions.get(e) else {
                return;
            };
            // input is disabled while awaiting
            if session.awaiting() {
                return;
            }
            draft.0.push_str(&typed);
            if keys.just_pressed(KeyCode::Backspace) {
                draft.0.pop();
            }
            if keys.just_pressed(KeyCode::Enter) {
                submit_draft(&mut commands, e, session, &mut draft);
            }
        }
        Route::Graph => {
            if !typed.is_empty() {
                graph.search_term.push_str(&typed);
            }
            if keys.just_pressed(KeyCode::Backspace) {
                graph.search_term.pop();
            }
            if keys.just_pressed(KeyCode::Enter) {
                graph.refresh();
            }
        }
        _ => {}
    }
}

fn button_colors(
    mut q: Query<(&Interaction, &mut BackgroundColor), (Changed<Interaction>, With<Button>, Without<BtnSend>, Without<NodeCard>)>,
) {
    for (i, mut bg) in &mut q {
        bg.0 = match *i {
            Interaction::Pressed => BTN_PRESSED,
            Interaction::Hovered => BTN_HOVER,
            Interaction::None => BTN_IDLE,
        };
    }
}

fn btn_nav(q: Query<(&Interaction, &NavButton), Changed<Interaction>>, mut route: ResMut<CurrentRoute>) {
    for (i, NavButton(target)) in &q {
        if *i == Interaction::Pressed && route.0 != *target {
            route.0 = *target;
            target.push_location();
        }
    }
}

fn btn_send(
    mut commands: Commands,
    q: Query<(&Interaction, &BtnSend), Changed<Interaction>>,
    q_sessions: Query<&ChatSession>,
    mut draft: ResMut<Draft>,
) {
    for (i, BtnSend(e)) in &q {
        if *i != Interaction::Pressed {
            continue;
        }
        if let Ok(session) = q_sessions.get(*e) {
            submit_draft(&mut commands, *e, session, &mut draft);
        }
    }
}

fn btn_refresh(q: Query<&Interaction, (Changed<Interaction>, With<BtnRefresh>)>, mut graph: ResMut<GraphBrowser>) {
    if q.iter().any(|i| *i == Interaction::Pressed) {
        graph.refresh();
    }
}

fn btn_export(
    q: Query<&Interaction, (Changed<Interaction>, With<BtnExport>)>,
    graph: Res<GraphBrowser>,
    mut q_text: Query<&mut Text, With<ExportText>>,
) {
    if !q.iter().any(|i| *i == Interaction::Pressed) {
        return;
    }
    let out = match graph.export() {
        Ok(json) => {
            info!(target: "deepbot", "graph export: {} bytes", json.len());
            json
        }
        Err(e) => {
            warn!(target: "deepbot", "graph export failed: {}", e);
            format!("export failed: {e}")
        }
    };
    if let Ok(mut t) = q_text.single_mut() {
        t.0 = out;
    }
}

fn btn_node(q: Query<(&Interaction, &NodeCard), Changed<Interaction>>, mut graph: ResMut<GraphBrowser>) {
    for (i, NodeCard(id)) in &q {
        if *i == Interaction::Pressed {
            graph.select(*id);
        }
    }
}

fn btn_probe(
    q: Query<&Interaction, (Changed<Interaction>, With<BtnProbe>)>,
    status: Res<ProbeStatus>,
    mut ev: EventWriter<RunProbe>,
) {
    if !status.running && q.iter().any(|i| *i == Interaction::Pressed) {
        ev.write(RunProbe::default());
    }
}

// ---------------------- text refresh ----------------------

fn refresh_transcripts(
    time: Res<Time>,
    sessions: Query<Ref<ChatSession>>,
    mut q: Query<(&TranscriptText, &mut Text)>,
) {
    for (TranscriptText(e), mut t) in &mut q {
        let Ok(s) = sessions.get(*e) else {
            continue;
        };
        // awaiting sessions redraw every frame to animate the typing row
        if s.is_changed() || s.awaiting() || t.0.is_empty() {
            let out = view::render_text(&view::transcript(&s.state), time.elapsed_secs());
            if t.0 != out {
                t.0 = out;
            }
        }
    }
}

fn refresh_prompt(draft: Res<Draft>, sessions: Query<&ChatSession>, mut q: Query<(&PromptText, &mut Text)>) {
    for (PromptText(e), mut t) in &mut q {
        let awaiting = sessions.get(*e).map(ChatSession::awaiting).unwrap_or(false);
        let out = if awaiting {
            "> (waiting for reply...)".to_string()
        } else {
            format!("> {} |", draft.0)
        };
        if t.0 != out {
            t.0 = out;
        }
    }
}

fn style_send_buttons(
    draft: Res<Draft>,
    sessions: Query<&ChatSession>,
    mut q: Query<(&Interaction, &BtnSend, &mut BackgroundColor)>,
) {
    for (i, BtnSend(e), mut bg) in &mut q {
        let enabled = sessions.get(*e).map(|s| s.state.can_submit(&draft.0)).unwrap_or(false);
        let color = match (enabled, *i) {
            (false, _) => BTN_DISABLED,
            (true, Interaction::Pressed) => BTN_PRESSED,
            (true, Interaction::Hovered) => BTN_HOVER,
            (true, Interaction::None) => BTN_IDLE,
        };
        if bg.0 != color {
            bg.0 = color;
        }
    }
}

fn refresh_search(graph: Res<GraphBrowser>, mut q: Query<&mut Text, With<SearchText>>) {
    for mut t in &mut q {
        // freshly spawned search text starts empty
        if graph.is_changed() || t.0.is_empty() {
            t.0 = format!("search: {} |", graph.search_term);
        }
    }
}

fn rebuild_cards(mut commands: Commands, graph: Res<GraphBrowser>, q_list: Query<(Entity, Ref<CardList>)>) {
    let selected = graph.selected().map(|n| n.id);
    for (list, marker) in &q_list {
        if !(graph.is_changed() || marker.is_added()) {
            continue;
        }
        commands.entity(list).despawn_related::<Children>();
        commands.entity(list).with_children(|p| {
            for node in graph.visible() {
                let bg = if selected == Some(node.id) { BTN_SELECTED } else { BTN_IDLE };
                p.spawn((
                    Button,
                    Node {
                        width: Val::Px(220.0),
                        padding: UiRect::all(Val::Px(8.0)),
                        flex_direction: FlexDirection::Column,
                        margin: UiRect::all(Val::Px(4.0)),
                        ..default()
                    },
                    BackgroundColor(bg),
                    NodeCard(node.id),
                ))
                .with_children(|c| {
                    label(c, node.label, 16.0, Color::WHITE);
                    label(c, format!("Connections: {}", node.degree), 13.0, MUTED);
                });
            }
        });
    }
}

fn refresh_selection(graph: Res<GraphBrowser>, mut q: Query<&mut Text, With<SelectedText>>) {
    for mut t in &mut q {
        let out = match graph.selected() {
            Some(n) => format!("selected: {} ({} connections)", n.label, n.degree),
            None => "selected: none".to_string(),
        };
        if t.0 != out {
            t.0 = out;
        }
    }
}

fn refresh_probe(status: Res<ProbeStatus>, mut q: Query<&mut Text, With<ProbeText>>) {
    let Some(result) = status.result.as_deref() else {
        return;
    };
    for mut t in &mut q {
        if t.0 != result {
            t.0 = result.to_string();
        }
    }
}
