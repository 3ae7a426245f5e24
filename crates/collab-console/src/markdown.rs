//! Task results arrive as markdown; the detail pane renders them through
//! termimad (via ratskin) into styled ratatui lines.

use ratatui::text::{Line, Span, Text};
use ratskin::RatSkin;
use std::sync::OnceLock;

pub fn render_markdown(input: &str, width: u16) -> Text<'static> {
    if input.trim().is_empty() {
        return Text::raw(String::new());
    }
    let source = space_out_headings(input);
    let lines = console_skin().parse(RatSkin::parse_text(source.as_str()), width);
    Text::from(
        lines
            .into_iter()
            .map(|line| {
                Line::from(
                    line.spans
                        .into_iter()
                        .map(|span| Span::styled(span.content.into_owned(), span.style))
                        .collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>(),
    )
}

/// Termimad wants headings separated from surrounding prose; agent results
/// often run them together.
fn space_out_headings(input: &str) -> String {
    let mut output: Vec<String> = Vec::new();
    for raw_line in input.lines() {
        let line = raw_line.trim_end_matches('\r');
        if is_heading(line.trim_start()) {
            if output
                .last()
                .map(|previous| !previous.trim().is_empty())
                .unwrap_or(false)
            {
                output.push(String::new());
            }
            output.push(line.to_owned());
            output.push(String::new());
            continue;
        }
        output.push(line.to_owned());
    }
    output.join("\n")
}

fn is_heading(line: &str) -> bool {
    let level = line.chars().take_while(|ch| *ch == '#').count();
    if level == 0 || level > 6 {
        return false;
    }
    line.get(level..)
        .map(str::trim_start)
        .map(|rest| !rest.is_empty())
        .unwrap_or(false)
}

fn console_skin() -> &'static RatSkin {
    static SKIN: OnceLock<RatSkin> = OnceLock::new();
    SKIN.get_or_init(|| {
        let mut skin = RatSkin::default();
        skin.skin.paragraph.set_fg((226, 232, 240).into());
        skin.skin.bold.set_fg((236, 239, 244).into());
        skin.skin.italic.set_fg((148, 163, 184).into());
        skin.skin.headers[0].set_fg((191, 219, 254).into());
        skin.skin.headers[1].set_fg((147, 197, 253).into());
        skin.skin.headers[2].set_fg((96, 165, 250).into());
        skin.skin
            .inline_code
            .set_fgbg((250, 204, 21).into(), (17, 26, 46).into());
        skin.skin
            .code_block
            .set_fgbg((226, 232, 240).into(), (17, 26, 46).into());
        skin.skin.bullet.set_fg((56, 189, 248).into());
        skin.skin.table.compound_style.set_fg((96, 165, 250).into());
        skin.skin.paragraph.right_margin = 0;
        skin.skin.code_block.left_margin = 0;
        for header in &mut skin.skin.headers {
            header.left_margin = 0;
            header.right_margin = 0;
        }
        skin
    })
}
