//! Format-string parser/evaluator for song output files.

use crate::song::{DatePrecision, SongSnapshot};

pub(crate) const DEFAULT_SONG_FORMAT: &str = "%t - %a";
const DEFAULT_ARTIST_SEPARATOR: &str = ", ";
const DEFAULT_EXPLICIT_MARKER: &str = "[E]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    pub artist_separator: String,
    pub explicit_marker: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            artist_separator: DEFAULT_ARTIST_SEPARATOR.to_string(),
            explicit_marker: DEFAULT_EXPLICIT_MARKER.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Specifier {
    Title,
    Artists,
    Album,
    Label,
    ReleaseDate,
    Year,
    TrackNumber,
    DiscNumber,
    Progress,
    Duration,
    TimeLeft,
    Explicit,
}

impl Specifier {
    fn from_char(ch: char) -> Option<Self> {
        match ch.to_ascii_lowercase() {
            't' => Some(Self::Title),
            'a' => Some(Self::Artists),
            'm' => Some(Self::Album),
            'x' => Some(Self::Label),
            'r' => Some(Self::ReleaseDate),
            'y' => Some(Self::Year),
            'n' => Some(Self::TrackNumber),
            'd' => Some(Self::DiscNumber),
            'p' => Some(Self::Progress),
            'l' => Some(Self::Duration),
            'o' => Some(Self::TimeLeft),
            'e' => Some(Self::Explicit),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TemplateSegment {
    Text(String),
    Field {
        specifier: Specifier,
        uppercase: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTemplate {
    segments: Vec<TemplateSegment>,
}

pub(crate) fn parse_template(source: &str) -> ParsedTemplate {
    let mut segments = Vec::new();
    let mut text_buffer = String::new();
    let mut chars = source.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            text_buffer.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            text_buffer.push('%');
            break;
        };
        match next {
            '%' => text_buffer.push('%'),
            's' | 'S' => text_buffer.push(' '),
            _ => match Specifier::from_char(next) {
                Some(specifier) => {
                    flush_text(&mut segments, &mut text_buffer);
                    segments.push(TemplateSegment::Field {
                        specifier,
                        uppercase: next.is_ascii_uppercase(),
                    });
                }
                None => {
                    text_buffer.push('%');
                    text_buffer.push(next);
                }
            },
        }
    }
    flush_text(&mut segments, &mut text_buffer);

    ParsedTemplate { segments }
}

pub(crate) fn render(
    parsed: &ParsedTemplate,
    song: &SongSnapshot,
    options: &RenderOptions,
) -> String {
    let mut rendered = String::new();
    for segment in &parsed.segments {
        match segment {
            TemplateSegment::Text(text) => rendered.push_str(text),
            TemplateSegment::Field {
                specifier,
                uppercase,
            } => {
                let value = field_value(*specifier, song, options);
                if *uppercase {
                    rendered.push_str(&value.to_uppercase());
                } else {
                    rendered.push_str(&value);
                }
            }
        }
    }
    rendered
}

pub(crate) fn render_template(
    source: &str,
    song: &SongSnapshot,
    options: &RenderOptions,
) -> String {
    render(&parse_template(source), song, options)
}

/// Replaces every `%s` with a literal space and leaves everything else as typed.
pub(crate) fn apply_space_directive(text: &str) -> String {
    text.replace("%s", " ")
}

fn field_value(specifier: Specifier, song: &SongSnapshot, options: &RenderOptions) -> String {
    match specifier {
        Specifier::Title => string_field(song, 't'),
        Specifier::Artists => song.artists().join(&options.artist_separator),
        Specifier::Album => string_field(song, 'm'),
        Specifier::Label => string_field(song, 'x'),
        Specifier::ReleaseDate => format_release_date(song),
        Specifier::Year => match song.release_precision() {
            DatePrecision::Unknown => String::new(),
            _ => song.year().to_string(),
        },
        Specifier::TrackNumber => format_count(song.get_int_value('n')),
        Specifier::DiscNumber => format_count(song.get_int_value('d')),
        Specifier::Progress => format_time_ms(song.progress_ms()),
        Specifier::Duration => format_time_ms(song.duration_ms()),
        Specifier::TimeLeft => song
            .get_int_value('o')
            .map(format_time_ms)
            .unwrap_or_default(),
        Specifier::Explicit => {
            if song.explicit() {
                options.explicit_marker.clone()
            } else {
                String::new()
            }
        }
    }
}

fn string_field(song: &SongSnapshot, specifier: char) -> String {
    song.get_string_value(specifier)
        .unwrap_or_default()
        .to_string()
}

fn format_count(value: Option<i32>) -> String {
    match value {
        Some(number) if number > 0 => number.to_string(),
        _ => String::new(),
    }
}

fn format_release_date(song: &SongSnapshot) -> String {
    match song.release_precision() {
        DatePrecision::Day => format!("{}-{}-{}", song.year(), song.month(), song.day()),
        DatePrecision::Month => format!("{}-{}", song.year(), song.month()),
        DatePrecision::Year => song.year().to_string(),
        DatePrecision::Unknown => String::new(),
    }
}

pub(crate) fn format_time_ms(ms: i32) -> String {
    let total_secs = ms.max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn flush_text(segments: &mut Vec<TemplateSegment>, text_buffer: &mut String) {
    if text_buffer.is_empty() {
        return;
    }
    segments.push(TemplateSegment::Text(std::mem::take(text_buffer)));
}

#[cfg(test)]
mod tests {
    use super::{apply_space_directive, format_time_ms, render_template, RenderOptions};
    use crate::song::SongSnapshot;

    fn song() -> SongSnapshot {
        let mut song = SongSnapshot::new();
        song.set_title("Song");
        song.append_artist("Artist");
        song.set_album("Album");
        song.set_label("Label");
        song.set_year("2020");
        song.set_month("05");
        song.set_day("17");
        song.set_track_number(7);
        song.set_disc_number(1);
        song.set_duration(245_000);
        song.set_progress(65_000);
        song.set_explicit(true);
        song.set_playing(true);
        song
    }

    #[test]
    fn test_title_and_artist() {
        let rendered = render_template("%t - %a", &song(), &RenderOptions::default());
        assert_eq!(rendered, "Song - Artist");
    }

    #[test]
    fn test_every_specifier() {
        let rendered = render_template(
            "%t|%a|%m|%x|%r|%y|%n|%d|%p|%l|%o|%e",
            &song(),
            &RenderOptions::default(),
        );
        assert_eq!(
            rendered,
            "Song|Artist|Album|Label|2020-05-17|2020|7|1|1:05|4:05|3:00|[E]"
        );
    }

    #[test]
    fn test_artist_separator_option() {
        let mut song = song();
        song.append_artist("Guest");
        let options = RenderOptions {
            artist_separator: " & ".to_string(),
            ..RenderOptions::default()
        };
        assert_eq!(render_template("%a", &song, &options), "Artist & Guest");
    }

    #[test]
    fn test_uppercase_specifiers() {
        let rendered = render_template("%T by %A", &song(), &RenderOptions::default());
        assert_eq!(rendered, "SONG by ARTIST");
    }

    #[test]
    fn test_space_directive_and_percent_escape() {
        let rendered = render_template("%s%s%s", &song(), &RenderOptions::default());
        assert_eq!(rendered, "   ");
        assert_eq!(apply_space_directive("%s%s%s"), "   ");
        let rendered = render_template("100%% %t", &song(), &RenderOptions::default());
        assert_eq!(rendered, "100% Song");
    }

    #[test]
    fn test_unknown_specifiers_pass_through() {
        let rendered = render_template("%q %t %", &song(), &RenderOptions::default());
        assert_eq!(rendered, "%q Song %");
    }

    #[test]
    fn test_release_date_respects_precision() {
        let mut song = SongSnapshot::new();
        song.set_year("1999");
        assert_eq!(
            render_template("%r/%y", &song, &RenderOptions::default()),
            "1999/1999"
        );
        song.set_month("12");
        assert_eq!(
            render_template("%r", &song, &RenderOptions::default()),
            "1999-12"
        );
        let empty = SongSnapshot::new();
        assert_eq!(render_template("%r%y", &empty, &RenderOptions::default()), "");
    }

    #[test]
    fn test_missing_numbers_render_empty() {
        let empty = SongSnapshot::new();
        assert_eq!(
            render_template("[%n/%d] %e", &empty, &RenderOptions::default()),
            "[/] "
        );
    }

    #[test]
    fn test_format_time_ms() {
        assert_eq!(format_time_ms(0), "0:00");
        assert_eq!(format_time_ms(59_999), "0:59");
        assert_eq!(format_time_ms(3_725_000), "1:02:05");
        assert_eq!(format_time_ms(-5), "0:00");
    }
}
