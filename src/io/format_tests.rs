use crate::io::format::{banner, rule, yes_no, Section, BANNER_WIDTH};

#[test]
fn test_format_section_delimiters() {
    let begin = Section::Macro.delimiter("Input loading", true);
    let end = Section::Macro.delimiter("Input loading", false);
    assert!(begin.starts_with("❬❬❬❬❬ [Begin] Input loading ❬"));
    assert!(end.starts_with("❭❭❭❭❭ [ End ] Input loading ❭"));
    assert_eq!(begin.chars().count(), BANNER_WIDTH);
    assert_eq!(end.chars().count(), BANNER_WIDTH);

    let micro = Section::Micro.delimiter("Subspace selection", true);
    assert!(micro.starts_with("‹‹‹‹‹ [Begin] Subspace selection ‹"));
    assert!(micro.ends_with('‹'));

    // Overlong titles are never truncated.
    let title = "x".repeat(2 * BANNER_WIDTH);
    assert!(Section::Micro.delimiter(&title, false).contains(&title));
}

#[test]
fn test_format_banner() {
    let lines = banner("Orbital Optimisation");
    assert!(lines
        .iter()
        .all(|line| line.chars().count() == BANNER_WIDTH));
    assert!(lines[1].contains(" Orbital Optimisation "));
    assert!(lines[0].starts_with('┌') && lines[2].ends_with('┘'));
}

#[test]
fn test_format_helpers() {
    assert_eq!(rule(3), "┈┈┈");
    assert_eq!(yes_no(true), "yes");
    assert_eq!(yes_no(false), "no");
}
