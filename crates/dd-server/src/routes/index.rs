//! `GET /`: list of registered streams.

use axum::http::StatusCode;
use axum::response::Response;

use crate::context::AppContext;
use crate::error::html_page;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn render(names: &[String]) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>DASH Streaming Server</title>\n<style>\n\
         body { font-family: Arial, sans-serif; margin: 40px; }\n\
         h1 { color: #333; }\n\
         ul { list-style-type: none; padding: 0; }\n\
         li { margin: 10px 0; }\n\
         a { color: #0066cc; text-decoration: none; }\n\
         a:hover { text-decoration: underline; }\n\
         </style>\n</head>\n<body>\n<h1>DASH Streaming Server</h1>\n<h2>Available streams:</h2>\n<ul>\n",
    );
    for name in names {
        let name = escape(name);
        html.push_str(&format!(
            "<li><a href='/{name}/manifest.mpd'>{name}</a></li>\n"
        ));
    }
    html.push_str(
        "</ul>\n<div style='margin-top: 30px;'>\n<h3>Playback:</h3>\n\
         <p>1. Follow a link above to fetch the MPD manifest.</p>\n\
         <p>2. Open it in a DASH-capable player such as VLC or dash.js.</p>\n\
         </div>\n</body>\n</html>\n",
    );
    html
}

pub fn index(ctx: &AppContext) -> Response {
    html_page(StatusCode::OK, render(&ctx.registry.names()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_every_stream() {
        let html = render(&["cam1".to_string(), "cam2".to_string()]);
        assert!(html.contains("<li><a href='/cam1/manifest.mpd'>cam1</a></li>"));
        assert!(html.contains("<li><a href='/cam2/manifest.mpd'>cam2</a></li>"));
    }

    #[test]
    fn names_are_escaped() {
        let html = render(&["<x>".to_string()]);
        assert!(html.contains("&lt;x&gt;"));
        assert!(!html.contains("<x>"));
    }
}
