//! Filter algebra
//!
//! [`FilterStatement`] is a closed tree of equality leaves and compound
//! containers that renders to RFC 4515 wire syntax and to a structured JSON
//! form (see [`structured`]).
//!
//! Leaves carry an optional value: `None` is the wildcard (`(cn=*)`), while a
//! value that renders empty is rewritten into the absence test
//! `(!(cn=*))` at construction. Containers never hold two structurally equal
//! children, so merging the same criterion twice is a no-op.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DirectoryError, DirectoryResult};

pub mod structured;

pub use structured::{from_structured, to_structured};

/// A value on the right-hand side of an equality leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Text, matched literally (`*` is escaped).
    Text(String),
    /// Substring pattern: `*` matches any run of characters.
    Pattern {
        pattern: String,
    },
    /// Integer, rendered in decimal.
    Integer(i64),
    /// Boolean, rendered as `TRUE` / `FALSE`.
    Boolean(bool),
    /// Binary, rendered byte by byte as `\xx`.
    Binary(Vec<u8>),
}

impl FilterValue {
    /// A substring pattern.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        FilterValue::Pattern {
            pattern: pattern.into(),
        }
    }

    /// Render in escaped wire form.
    pub fn render(&self) -> String {
        match self {
            FilterValue::Text(s) => escape_text(s, true),
            FilterValue::Pattern { pattern } => escape_text(pattern, false),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            FilterValue::Binary(bytes) => bytes.iter().map(|b| format!("\\{b:02x}")).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(s) | FilterValue::Pattern { pattern: s } => s.is_empty(),
            FilterValue::Binary(b) => b.is_empty(),
            FilterValue::Integer(_) | FilterValue::Boolean(_) => false,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Integer(i)
    }
}

impl From<i32> for FilterValue {
    fn from(i: i32) -> Self {
        FilterValue::Integer(i64::from(i))
    }
}

impl From<u32> for FilterValue {
    fn from(i: u32) -> Self {
        FilterValue::Integer(i64::from(i))
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Boolean(b)
    }
}

impl From<Vec<u8>> for FilterValue {
    fn from(b: Vec<u8>) -> Self {
        FilterValue::Binary(b)
    }
}

/// GUIDs are matched against `objectGUID` in their stored byte order.
impl From<Uuid> for FilterValue {
    fn from(guid: Uuid) -> Self {
        FilterValue::Binary(guid.to_bytes_le().to_vec())
    }
}

/// Escape special characters in filter values (RFC 4515). `*` is escaped
/// only for literal text.
fn escape_text(value: &str, literal: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' if literal => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Case-insensitive comparison shared by filter and value equality.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Extensible-match rules understood by Active Directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// `LDAP_MATCHING_RULE_BIT_AND`: every bit of the mask is set.
    BitwiseAnd,
    /// `LDAP_MATCHING_RULE_BIT_OR`: any bit of the mask is set.
    BitwiseOr,
    /// `LDAP_MATCHING_RULE_IN_CHAIN`: transitive DN-valued match.
    InChain,
}

impl MatchRule {
    /// The rule's object identifier.
    #[must_use]
    pub fn oid(&self) -> &'static str {
        match self {
            MatchRule::BitwiseAnd => "1.2.840.113556.1.4.803",
            MatchRule::BitwiseOr => "1.2.840.113556.1.4.804",
            MatchRule::InChain => "1.2.840.113556.1.4.1941",
        }
    }

    /// Look up a rule by object identifier.
    #[must_use]
    pub fn from_oid(oid: &str) -> Option<Self> {
        [MatchRule::BitwiseAnd, MatchRule::BitwiseOr, MatchRule::InChain]
            .into_iter()
            .find(|rule| rule.oid() == oid)
    }
}

/// An equality leaf: `(property=value)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EqualStatement {
    /// Attribute name.
    pub property: String,
    /// Value to match; `None` matches any value.
    pub value: Option<FilterValue>,
    /// Optional extensible-match rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_rule: Option<MatchRule>,
}

impl EqualStatement {
    /// Attribute name as rendered, including any match-rule suffix.
    pub fn rendered_attribute(&self) -> String {
        match self.match_rule {
            Some(rule) => format!("{}:{}:", self.property, rule.oid()),
            None => self.property.clone(),
        }
    }

    /// Value as rendered on the wire.
    pub fn rendered_value(&self) -> String {
        self.value
            .as_ref()
            .map_or_else(|| "*".to_string(), FilterValue::render)
    }

    /// Check if this leaf is the wildcard (presence) form.
    pub fn is_wildcard(&self) -> bool {
        self.value.is_none()
    }
}

impl PartialEq for EqualStatement {
    fn eq(&self, other: &Self) -> bool {
        eq_ignore_case(&self.rendered_attribute(), &other.rendered_attribute())
            && eq_ignore_case(&self.rendered_value(), &other.rendered_value())
    }
}

impl Eq for EqualStatement {}

impl fmt::Display for EqualStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}={})", self.rendered_attribute(), self.rendered_value())
    }
}

/// Kind of compound container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompoundKind {
    /// All children match.
    And,
    /// Any child matches.
    Or,
    /// No child matches.
    Nor,
}

impl CompoundKind {
    /// Structured-form key for this container.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            CompoundKind::And => "and",
            CompoundKind::Or => "or",
            CompoundKind::Nor => "nor",
        }
    }

    fn wrap(self, children: Vec<FilterStatement>) -> FilterStatement {
        match self {
            CompoundKind::And => FilterStatement::And(children),
            CompoundKind::Or => FilterStatement::Or(children),
            CompoundKind::Nor => FilterStatement::Nor(children),
        }
    }
}

/// A search filter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStatement {
    /// `(property=value)`
    Equal(EqualStatement),
    /// `(&...)`
    And(Vec<FilterStatement>),
    /// `(|...)`
    Or(Vec<FilterStatement>),
    /// `(!(property=value))`
    Not(EqualStatement),
    /// `(!(|...))`
    Nor(Vec<FilterStatement>),
}

impl FilterStatement {
    /// Build an equality leaf.
    ///
    /// A value that renders empty becomes the absence test
    /// `(!(property=*))`. The name is checked by
    /// [`FilterStatement::validate`] before a search runs; use
    /// [`FilterStatement::try_equal`] to reject it up front.
    pub fn equal(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(property.into(), Some(value.into()), None)
    }

    /// Build an equality leaf after validating the attribute name.
    pub fn try_equal(
        property: impl Into<String>,
        value: Option<FilterValue>,
    ) -> DirectoryResult<Self> {
        let property = property.into();
        validate_attribute_name(&property)?;
        Ok(Self::leaf(property, value, None))
    }

    /// `(property=pattern)` where `*` in the pattern is a wildcard.
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::leaf(property.into(), Some(FilterValue::pattern(pattern)), None)
    }

    /// `(property=*)`: the attribute has any value.
    pub fn present(property: impl Into<String>) -> Self {
        Self::leaf(property.into(), None, None)
    }

    /// `(!(property=*))`: the attribute is absent.
    pub fn absent(property: impl Into<String>) -> Self {
        FilterStatement::Not(EqualStatement {
            property: property.into(),
            value: None,
            match_rule: None,
        })
    }

    /// Every bit of `mask` is set in `property`.
    pub fn bitwise_and(property: impl Into<String>, mask: i64) -> Self {
        Self::leaf(
            property.into(),
            Some(FilterValue::Integer(mask)),
            Some(MatchRule::BitwiseAnd),
        )
    }

    /// Any bit of `mask` is set in `property`.
    pub fn bitwise_or(property: impl Into<String>, mask: i64) -> Self {
        Self::leaf(
            property.into(),
            Some(FilterValue::Integer(mask)),
            Some(MatchRule::BitwiseOr),
        )
    }

    /// `property` reaches `dn` through a chain of DN-valued links
    /// (e.g. nested group membership).
    pub fn in_chain(property: impl Into<String>, dn: impl Into<String>) -> Self {
        Self::leaf(
            property.into(),
            Some(FilterValue::Text(dn.into())),
            Some(MatchRule::InChain),
        )
    }

    /// Build a leaf with an explicit match rule.
    pub fn with_match_rule(
        property: impl Into<String>,
        value: Option<FilterValue>,
        rule: Option<MatchRule>,
    ) -> Self {
        Self::leaf(property.into(), value, rule)
    }

    fn leaf(property: String, value: Option<FilterValue>, match_rule: Option<MatchRule>) -> Self {
        match value {
            Some(v) if v.is_empty() => FilterStatement::Not(EqualStatement {
                property,
                value: None,
                match_rule: None,
            }),
            value => FilterStatement::Equal(EqualStatement {
                property,
                value,
                match_rule,
            }),
        }
    }

    /// `(&...)` over de-duplicated children.
    pub fn and(children: impl IntoIterator<Item = FilterStatement>) -> Self {
        CompoundKind::And.wrap(dedup(children))
    }

    /// `(|...)` over de-duplicated children.
    pub fn or(children: impl IntoIterator<Item = FilterStatement>) -> Self {
        CompoundKind::Or.wrap(dedup(children))
    }

    /// `(!(|...))` over de-duplicated children.
    pub fn nor(children: impl IntoIterator<Item = FilterStatement>) -> Self {
        CompoundKind::Nor.wrap(dedup(children))
    }

    /// Wrap a leaf in `Not`; compound statements are rejected.
    pub fn try_not(statement: FilterStatement) -> DirectoryResult<Self> {
        match statement {
            FilterStatement::Equal(leaf) => Ok(FilterStatement::Not(leaf)),
            other => Err(DirectoryError::malformed(format!(
                "negation must wrap a single equality statement, got {}",
                other.kind_name()
            ))),
        }
    }

    /// Logical negation.
    ///
    /// Leaves become `Not`, `Not` unwraps, `Or` and `Nor` swap, and `And`
    /// is distributed by De Morgan into an `Or` of negated children.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            FilterStatement::Equal(leaf) => FilterStatement::Not(leaf),
            FilterStatement::Not(leaf) => FilterStatement::Equal(leaf),
            FilterStatement::Or(children) => FilterStatement::Nor(children),
            FilterStatement::Nor(children) => FilterStatement::Or(children),
            FilterStatement::And(children) => {
                FilterStatement::or(children.into_iter().map(FilterStatement::negate))
            }
        }
    }

    /// Merge a criterion into a container of `kind`.
    ///
    /// If `self` is not already such a container it is wrapped first. The
    /// criterion is appended only if no structurally equal child exists.
    #[must_use]
    pub fn add_criterion(self, kind: CompoundKind, criterion: FilterStatement) -> Self {
        let mut children = match (kind, self) {
            (CompoundKind::And, FilterStatement::And(children))
            | (CompoundKind::Or, FilterStatement::Or(children))
            | (CompoundKind::Nor, FilterStatement::Nor(children)) => children,
            (_, other) => vec![other],
        };
        push_unique(&mut children, criterion);
        kind.wrap(children)
    }

    /// Children of a compound statement (empty for leaves).
    pub fn children(&self) -> &[FilterStatement] {
        match self {
            FilterStatement::And(children)
            | FilterStatement::Or(children)
            | FilterStatement::Nor(children) => children,
            FilterStatement::Equal(_) | FilterStatement::Not(_) => &[],
        }
    }

    /// Check if this statement is a leaf (`Equal` or `Not`).
    pub fn is_leaf(&self) -> bool {
        matches!(self, FilterStatement::Equal(_) | FilterStatement::Not(_))
    }

    /// Name of the statement kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FilterStatement::Equal(_) => "equal",
            FilterStatement::And(_) => "and",
            FilterStatement::Or(_) => "or",
            FilterStatement::Not(_) => "not",
            FilterStatement::Nor(_) => "nor",
        }
    }

    /// Check every attribute name in the tree.
    pub fn validate(&self) -> DirectoryResult<()> {
        match self {
            FilterStatement::Equal(leaf) | FilterStatement::Not(leaf) => {
                validate_attribute_name(&leaf.property)
            }
            FilterStatement::And(children)
            | FilterStatement::Or(children)
            | FilterStatement::Nor(children) => {
                children.iter().try_for_each(FilterStatement::validate)
            }
        }
    }

    /// Render to LDAP wire syntax.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FilterStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStatement::Equal(leaf) => write!(f, "{leaf}"),
            FilterStatement::Not(leaf) => write!(f, "(!{leaf})"),
            FilterStatement::And(children) => write_group(f, "(&", children, ")"),
            FilterStatement::Or(children) => write_group(f, "(|", children, ")"),
            FilterStatement::Nor(children) => write_group(f, "(!(|", children, "))"),
        }
    }
}

fn write_group(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    children: &[FilterStatement],
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for child in children {
        write!(f, "{child}")?;
    }
    f.write_str(close)
}

fn push_unique(children: &mut Vec<FilterStatement>, criterion: FilterStatement) -> bool {
    if children.contains(&criterion) {
        return false;
    }
    children.push(criterion);
    true
}

fn dedup(children: impl IntoIterator<Item = FilterStatement>) -> Vec<FilterStatement> {
    let mut unique = Vec::new();
    for child in children {
        push_unique(&mut unique, child);
    }
    unique
}

/// Reject attribute names that could break out of a filter component.
///
/// Accepts LDAP descriptors (`sAMAccountName`, `msDS-Foo`) and numeric OIDs.
pub fn validate_attribute_name(name: &str) -> DirectoryResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';');
    if valid {
        Ok(())
    } else {
        Err(DirectoryError::malformed(format!(
            "invalid attribute name '{name}'"
        )))
    }
}

/// Accumulates criteria from repeated query-parameter merges.
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    root: Option<FilterStatement>,
}

impl FilterBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a criterion under `kind`.
    pub fn merge(&mut self, kind: CompoundKind, criterion: FilterStatement) -> &mut Self {
        self.root = Some(match self.root.take() {
            Some(root) => root.add_criterion(kind, criterion),
            None => criterion,
        });
        self
    }

    /// Merge a criterion that must also hold.
    #[must_use]
    pub fn and(mut self, criterion: FilterStatement) -> Self {
        self.merge(CompoundKind::And, criterion);
        self
    }

    /// Merge a criterion that may hold instead.
    #[must_use]
    pub fn or(mut self, criterion: FilterStatement) -> Self {
        self.merge(CompoundKind::Or, criterion);
        self
    }

    /// Check if no criterion has been merged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Option<FilterStatement> {
        self.root
    }
}

/// Combine criteria into one statement: all of them must hold.
///
/// A single criterion is returned bare; no criteria yields `None`.
pub fn build_filter(criteria: impl IntoIterator<Item = FilterStatement>) -> Option<FilterStatement> {
    criteria
        .into_iter()
        .fold(FilterBuilder::new(), FilterBuilder::and)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negate_leaf_renders_not() {
        let filter = FilterStatement::equal("objectClass", "group").negate();
        assert_eq!(filter.render(), "(!(objectClass=group))");
        assert!(matches!(filter, FilterStatement::Not(_)));
    }

    #[test]
    fn test_double_negation_collapses() {
        let leaf = FilterStatement::equal("cn", "admin");
        assert_eq!(leaf.clone().negate().negate(), leaf);
    }

    #[test]
    fn test_negate_compound_is_lifted() {
        let or = FilterStatement::or([
            FilterStatement::equal("cn", "a"),
            FilterStatement::equal("cn", "b"),
        ]);
        let nor = or.negate();
        assert!(matches!(nor, FilterStatement::Nor(_)));
        assert_eq!(nor.render(), "(!(|(cn=a)(cn=b)))");

        let and = FilterStatement::and([
            FilterStatement::equal("cn", "a"),
            FilterStatement::present("mail"),
        ]);
        assert_eq!(and.negate().render(), "(|(!(cn=a))(!(mail=*)))");
    }

    #[test]
    fn test_try_not_rejects_compound() {
        let and = FilterStatement::and([FilterStatement::equal("cn", "a")]);
        assert!(matches!(
            FilterStatement::try_not(and),
            Err(DirectoryError::MalformedFilter { .. })
        ));
        assert!(FilterStatement::try_not(FilterStatement::equal("cn", "a")).is_ok());
    }

    #[test]
    fn test_empty_value_becomes_absence_test() {
        let filter = FilterStatement::equal("manager", "");
        assert_eq!(filter.render(), "(!(manager=*))");
        assert_eq!(filter, FilterStatement::absent("manager"));
    }

    #[test]
    fn test_wildcard_is_distinct_from_absence() {
        let present = FilterStatement::present("mail");
        assert_eq!(present.render(), "(mail=*)");
        assert_ne!(present, FilterStatement::absent("mail"));
    }

    #[test]
    fn test_add_criterion_promotes_and_is_idempotent() {
        let root = FilterStatement::equal("objectClass", "user");
        let merged = root
            .add_criterion(CompoundKind::And, FilterStatement::equal("cn", "john"))
            .add_criterion(CompoundKind::And, FilterStatement::equal("CN", "JOHN"));

        assert_eq!(merged.children().len(), 2);
        assert_eq!(merged.render(), "(&(objectClass=user)(cn=john))");
    }

    #[test]
    fn test_add_criterion_wraps_other_container_kind() {
        let or = FilterStatement::or([
            FilterStatement::equal("cn", "a"),
            FilterStatement::equal("cn", "b"),
        ]);
        let merged = or.add_criterion(CompoundKind::And, FilterStatement::present("mail"));
        assert_eq!(merged.render(), "(&(|(cn=a)(cn=b))(mail=*))");
    }

    #[test]
    fn test_bitwise_rendering() {
        let filter = FilterStatement::bitwise_and("userAccountControl", 2);
        assert_eq!(
            filter.render(),
            "(userAccountControl:1.2.840.113556.1.4.803:=2)"
        );
        let filter = FilterStatement::bitwise_or("groupType", 0x8000_0000);
        assert_eq!(
            filter.render(),
            "(groupType:1.2.840.113556.1.4.804:=2147483648)"
        );
    }

    #[test]
    fn test_structural_equality_ignores_case() {
        assert_eq!(
            FilterStatement::equal("sAMAccountName", "JDoe"),
            FilterStatement::equal("samaccountname", "jdoe")
        );
        assert_ne!(
            FilterStatement::equal("cn", "2"),
            FilterStatement::bitwise_and("cn", 2)
        );
    }

    #[test]
    fn test_value_escaping() {
        let filter = FilterStatement::equal("cn", "a(b)*c\\d");
        assert_eq!(filter.render(), "(cn=a\\28b\\29\\2ac\\5cd)");

        let pattern = FilterStatement::like("cn", "a(b)*c\\d");
        assert_eq!(pattern.render(), "(cn=a\\28b\\29*c\\5cd)");
        assert_ne!(filter, pattern);

        let filter = FilterStatement::equal("objectSid", vec![0x01u8, 0x05, 0xff]);
        assert_eq!(filter.render(), "(objectSid=\\01\\05\\ff)");
    }

    #[test]
    fn test_guid_filter_uses_stored_byte_order() {
        let guid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let filter = FilterStatement::equal("objectGUID", guid);
        assert_eq!(
            filter.render(),
            "(objectGUID=\\33\\22\\11\\00\\55\\44\\77\\66\\88\\99\\aa\\bb\\cc\\dd\\ee\\ff)"
        );
    }

    #[test]
    fn test_build_filter() {
        assert!(build_filter(Vec::new()).is_none());

        let single = build_filter([FilterStatement::equal("cn", "x")]).unwrap();
        assert_eq!(single.render(), "(cn=x)");

        let filter = build_filter([
            FilterStatement::equal("objectClass", "user"),
            FilterStatement::equal("cn", "x"),
            FilterStatement::equal("objectclass", "USER"),
        ])
        .unwrap();
        assert_eq!(filter.render(), "(&(objectClass=user)(cn=x))");
    }

    #[test]
    fn test_try_equal_rejects_injection_in_name() {
        assert!(FilterStatement::try_equal("cn=*)(objectClass", None).is_err());
        assert!(FilterStatement::try_equal("msDS-UserPasswordExpiryTimeComputed", None).is_ok());
        assert!(FilterStatement::try_equal("1.2.840.113556.1.4.221", None).is_ok());

        let nested = FilterStatement::and([
            FilterStatement::equal("objectClass", "user"),
            FilterStatement::or([FilterStatement::equal("cn=*)(objectClass", "x")]),
        ]);
        assert!(matches!(
            nested.validate(),
            Err(DirectoryError::MalformedFilter { .. })
        ));
        assert!(FilterStatement::bitwise_and("userAccountControl", 2)
            .negate()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_in_chain() {
        let filter = FilterStatement::in_chain("memberOf", "CN=Admins,DC=corp,DC=com");
        assert_eq!(
            filter.render(),
            "(memberOf:1.2.840.113556.1.4.1941:=CN=Admins,DC=corp,DC=com)"
        );
    }
}
