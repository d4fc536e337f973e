//! The parser combinators named in the query language's design notes:
//! `seq`, `alt`, `repeat`, `optional`, `ignore`, `guard`. Each is a plain
//! function over `&str` returning the unconsumed remainder alongside the
//! parsed value, in the style of `risingwave_sqlparser`'s hand-written
//! recursive-descent parser, just generalized to composable functions
//! instead of methods on a single `Parser` struct.

pub type PResult<'a, O> = Result<(&'a str, O), String>;

/// Two parsers back to back, returning both results.
pub fn seq<'a, A, B>(
    a: impl Fn(&'a str) -> PResult<'a, A>,
    b: impl Fn(&'a str) -> PResult<'a, B>,
) -> impl Fn(&'a str) -> PResult<'a, (A, B)> {
    move |input| {
        let (rest, av) = a(input)?;
        let (rest, bv) = b(rest)?;
        Ok((rest, (av, bv)))
    }
}

/// The first of two parsers to succeed, trying `a` before `b`.
pub fn alt<'a, O>(
    a: impl Fn(&'a str) -> PResult<'a, O>,
    b: impl Fn(&'a str) -> PResult<'a, O>,
) -> impl Fn(&'a str) -> PResult<'a, O> {
    move |input| a(input).or_else(|_| b(input))
}

/// Zero or more repetitions, greedy, never failing.
pub fn repeat<'a, O>(p: impl Fn(&'a str) -> PResult<'a, O>) -> impl Fn(&'a str) -> PResult<'a, Vec<O>> {
    move |mut input| {
        let mut out = Vec::new();
        loop {
            match p(input) {
                Ok((rest, v)) => {
                    if rest.len() == input.len() {
                        // A zero-width match would loop forever.
                        break;
                    }
                    out.push(v);
                    input = rest;
                }
                Err(_) => break,
            }
        }
        Ok((input, out))
    }
}

/// `p` if it matches, else `None`, consuming nothing on failure.
pub fn optional<'a, O>(p: impl Fn(&'a str) -> PResult<'a, O>) -> impl Fn(&'a str) -> PResult<'a, Option<O>> {
    move |input| match p(input) {
        Ok((rest, v)) => Ok((rest, Some(v))),
        Err(_) => Ok((input, None)),
    }
}

/// Runs `p` but discards its value, useful for punctuation and keywords.
pub fn ignore<'a, O>(p: impl Fn(&'a str) -> PResult<'a, O>) -> impl Fn(&'a str) -> PResult<'a, ()> {
    move |input| p(input).map(|(rest, _)| (rest, ()))
}

/// Runs `p`, then fails unless `pred` accepts the parsed value. Used to
/// reject syntactically valid but semantically impossible parses early
/// (e.g. a port number literal over 65535).
pub fn guard<'a, O>(
    p: impl Fn(&'a str) -> PResult<'a, O>,
    pred: impl Fn(&O) -> bool,
    msg: &'static str,
) -> impl Fn(&'a str) -> PResult<'a, O> {
    move |input| {
        let (rest, v) = p(input)?;
        if pred(&v) {
            Ok((rest, v))
        } else {
            Err(msg.to_string())
        }
    }
}

/// Skips leading ASCII whitespace.
pub fn ws(input: &str) -> PResult<'_, ()> {
    Ok((input.trim_start(), ()))
}

/// Matches a literal token, skipping leading whitespace first.
pub fn tag<'a>(tok: &'static str) -> impl Fn(&'a str) -> PResult<'a, &'a str> {
    move |input| {
        let (input, _) = ws(input)?;
        input
            .strip_prefix(tok)
            .map(|rest| (rest, tok))
            .ok_or_else(|| format!("expected {tok:?}"))
    }
}

/// Matches a run of characters satisfying `pred`, at least one, after
/// skipping leading whitespace.
pub fn take_while1<'a>(
    what: &'static str,
    pred: impl Fn(char) -> bool,
) -> impl Fn(&'a str) -> PResult<'a, &'a str> {
    move |input| {
        let (input, _) = ws(input)?;
        let end = input.find(|c| !pred(c)).unwrap_or(input.len());
        if end == 0 {
            return Err(format!("expected {what}"));
        }
        Ok((&input[end..], &input[..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_consumes_both_parsers_in_order() {
        let p = seq(tag("a"), tag("b"));
        assert_eq!(p("ab rest").unwrap(), (" rest", ("a", "b")));
    }

    #[test]
    fn alt_falls_through_to_second_option() {
        let p = alt(tag("x"), tag("y"));
        assert_eq!(p("y!").unwrap(), ("!", "y"));
        assert!(p("z").is_err());
    }

    #[test]
    fn repeat_collects_until_first_failure() {
        let p = repeat(tag("a"));
        assert_eq!(p("aaab").unwrap(), ("b", vec!["a", "a", "a"]));
        assert_eq!(p("b").unwrap(), ("b", vec![]));
    }

    #[test]
    fn optional_never_fails() {
        let p = optional(tag("a"));
        assert_eq!(p("a").unwrap(), ("", Some("a")));
        assert_eq!(p("b").unwrap(), ("b", None));
    }

    #[test]
    fn guard_rejects_out_of_range_values() {
        let number = take_while1("digits", |c| c.is_ascii_digit());
        let p = guard(number, |s: &&str| s.len() <= 3, "too many digits");
        assert!(p("42").is_ok());
        assert!(p("123456").is_err());
    }
}
