// fonts.rs — egui font selection for element text
//
// Element text is arbitrary user content, so we try to find a system font with
// wide script coverage. ab_glyph is used only to reject files egui could not parse
// (.ttc collections are hit or miss).

use std::path::{Path, PathBuf};

fn parses(bytes: &[u8]) -> bool {
    ab_glyph::FontRef::try_from_slice(bytes).is_ok()
}

fn load_font(path: &Path) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    parses(&bytes).then_some(bytes)
}

fn candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();

    if cfg!(windows) {
        let dir = PathBuf::from(r"C:\Windows\Fonts");
        for f in ["msyh.ttf", "simhei.ttf", "meiryo.ttf", "malgun.ttf", "arial.ttf", "segoeui.ttf"] {
            out.push(dir.join(f));
        }
    } else if cfg!(target_os = "macos") {
        for p in [
            "/System/Library/Fonts/PingFang.ttc",
            "/System/Library/Fonts/Hiragino Sans GB.ttc",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/Library/Fonts/Arial Unicode.ttf",
        ] {
            out.push(PathBuf::from(p));
        }
    } else {
        for p in [
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
            "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        ] {
            out.push(PathBuf::from(p));
        }
    }

    // bundled fonts next to the binary or in the working directory
    let bundled = ["NotoSansSC-Regular.otf", "NotoSans-Regular.ttf"];
    if let Some(dir) = std::env::current_exe().ok().and_then(|e| e.parent().map(Path::to_path_buf)) {
        out.extend(bundled.iter().map(|f| dir.join("assets").join(f)));
    }
    out.extend(bundled.iter().map(|f| PathBuf::from("assets").join(f)));
    out
}

/// Puts the first usable font in front of egui's defaults. Keeps the defaults if none is found.
pub fn setup_egui_fonts(ctx: &egui::Context) {
    let Some((path, bytes)) = candidates().into_iter().find_map(|p| load_font(&p).map(|b| (p, b))) else {
        log::warn!("no system font found, using egui defaults");
        return;
    };
    log::info!("using font {}", path.display());

    let mut fonts = egui::FontDefinitions::default();
    fonts.font_data.insert("ui".to_owned(), egui::FontData::from_owned(bytes));
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        if let Some(list) = fonts.families.get_mut(&family) {
            list.insert(0, "ui".to_owned());
        }
    }
    ctx.set_fonts(fonts);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_not_a_font() {
        assert!(!parses(b"definitely not a font file"));
        assert!(load_font(Path::new("/no/such/font.ttf")).is_none());
    }

    #[test]
    fn bundled_paths_are_searched_last() {
        let list = candidates();
        assert_eq!(list.last(), Some(&PathBuf::from("assets").join("NotoSans-Regular.ttf")));
    }
}
