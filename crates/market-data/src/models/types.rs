use std::borrow::Cow;

/// Source identifier - mostly static constants ("yahoo", "finnhub", ...)
pub type SourceName = Cow<'static, str>;
