use crate::app::{AppState, InputMode, LineKind, MENU};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

/// 画面上部の表示情報
pub struct Header<'a> {
    pub platform: &'a str,
    pub target: &'a str,
}

/// TUIを描画
pub fn render(frame: &mut Frame, app: &mut AppState, header: &Header) {
    // メインレイアウト: 左メニュー | 右出力
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(34), // メニュー
            Constraint::Min(20),    // 出力
        ])
        .split(frame.area());

    // 右エリア: 出力 | 入力 | ステータスバー
    let content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // 出力
            Constraint::Length(3), // 入力
            Constraint::Length(1), // ステータスバー
        ])
        .split(main_chunks[1]);

    render_menu(frame, app, header, main_chunks[0]);
    render_output(frame, app, content_chunks[0]);
    render_input_area(frame, app, content_chunks[1]);
    render_status_bar(frame, app, header, content_chunks[2]);
}

/// メニューを描画
fn render_menu(frame: &mut Frame, app: &mut AppState, header: &Header, area: Rect) {
    let items: Vec<ListItem> = MENU
        .iter()
        .map(|(key, item)| ListItem::new(format!("{}  {}", key, item.label())))
        .collect();

    let border_style = match app.input_mode {
        InputMode::Normal => Style::default().fg(Color::Cyan),
        InputMode::Editing => Style::default().fg(Color::DarkGray),
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Target: {}", header.target))
                .border_style(border_style),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");

    frame.render_stateful_widget(list, area, &mut app.menu_state);
}

/// 出力欄を描画（末尾が見えるようにスクロール）
fn render_output(frame: &mut Frame, app: &AppState, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.output.len().saturating_sub(visible);

    let lines: Vec<Line> = app
        .output
        .iter()
        .skip(skip)
        .map(|(kind, text)| {
            let style = match kind {
                LineKind::Heading => Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
                LineKind::Info => Style::default(),
                LineKind::Error => Style::default().fg(Color::Red),
            };
            Line::from(Span::styled(text.as_str(), style))
        })
        .collect();

    let output = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Output"),
    );

    frame.render_widget(output, area);
}

/// 入力エリアを描画
fn render_input_area(frame: &mut Frame, app: &AppState, area: Rect) {
    let style = match app.input_mode {
        InputMode::Editing => Style::default().fg(Color::Yellow),
        InputMode::Normal => Style::default(),
    };

    let title = match app.input_mode {
        InputMode::Editing => "storage.json path (Esc to cancel, Enter to save)",
        InputMode::Normal => "Input",
    };

    let input = Paragraph::new(app.input_buffer.as_str())
        .style(style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(style),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(input, area);

    // カーソル表示（編集モードの場合）
    if app.input_mode == InputMode::Editing {
        let cursor_x = area.x + app.input_buffer.chars().count() as u16 + 1;
        let cursor_y = area.y + 1;
        frame.set_cursor_position((cursor_x, cursor_y));
    }
}

/// ステータスバーを描画
fn render_status_bar(frame: &mut Frame, app: &AppState, header: &Header, area: Rect) {
    let platform = Span::styled(
        format!(" {} ", header.platform),
        Style::default().fg(Color::Black).bg(Color::Green),
    );

    let children = if app.running_children > 0 {
        Span::styled(
            format!(" {} launched ", app.running_children),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )
    } else {
        Span::raw("")
    };

    let help = match app.input_mode {
        InputMode::Normal => Span::raw(" 0-7: Select | ↑/k ↓/j Enter | q: Quit | Ctrl+C: Abort "),
        InputMode::Editing => Span::raw(" Esc: Cancel | Enter: Save path "),
    };

    let status_line = Line::from(vec![platform, children, help]);
    let paragraph = Paragraph::new(status_line).alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}
