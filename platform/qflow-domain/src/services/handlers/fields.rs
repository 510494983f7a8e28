use crate::value_objects::node::Node;
use serde::Serialize;

/// Parallel lists of expressions and column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldList {
    pub exprs: Vec<String>,
    pub names: Vec<String>,
}

impl FieldList {
    pub fn new(exprs: Vec<String>, names: Vec<String>) -> Result<Self, String> {
        if exprs.len() != names.len() {
            return Err(format!(
                "fields info has {} expressions but {} names",
                exprs.len(),
                names.len()
            ));
        }
        Ok(Self { exprs, names })
    }

    /// Expressions that double as their own column names.
    pub fn named_by_expr(exprs: Vec<String>) -> Self {
        Self {
            names: exprs.clone(),
            exprs,
        }
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    fn push(&mut self, expr: String, name: String) {
        self.exprs.push(expr);
        self.names.push(name);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exprs
            .iter()
            .zip(self.names.iter())
            .map(|(e, n)| (e.as_str(), n.as_str()))
    }

    /// Parses `["expr", ...]` or `[["expr", ...], ["name", ...]]`.
    pub fn from_node(node: &Node, path: &str) -> Result<Self, String> {
        let Some(items) = node.as_seq() else {
            return Err(format!(
                "{path}: expected a list of expressions or an [exprs, names] pair, got {}",
                node.kind()
            ));
        };

        if items.len() == 2 && items.iter().all(|item| matches!(item, Node::Seq(_))) {
            let exprs = string_list(&items[0], &format!("{path}.0"))?;
            let names = string_list(&items[1], &format!("{path}.1"))?;
            return Self::new(exprs, names).map_err(|err| format!("{path}: {err}"));
        }
        Ok(Self::named_by_expr(string_list(node, path)?))
    }
}

fn string_list(node: &Node, path: &str) -> Result<Vec<String>, String> {
    let items = node
        .as_seq()
        .ok_or_else(|| format!("{path}: expected a list, got {}", node.kind()))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Node::Str(s) => Ok(s.clone()),
            other => Err(format!("{path}.{idx}: expected a string, got {}", other.kind())),
        })
        .collect()
}

/// Data loader column config: a single fields info or named groups of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum LoaderFields {
    Flat { fields: FieldList },
    Grouped { groups: Vec<(String, FieldList)> },
}

impl LoaderFields {
    /// A group may also be given as a feature-spec mapping
    /// (`kbar` / `price` / `volume` / `rolling`), expanded on the spot.
    pub fn from_node(node: &Node, path: &str) -> Result<Self, String> {
        match node {
            Node::Map(mapping) => {
                let mut groups = Vec::with_capacity(mapping.len());
                for (group, info) in mapping.iter() {
                    let group_path = format!("{path}.{group}");
                    let fields = match info {
                        Node::Map(_) => FeatureSpec::from_node(info, &group_path)?.to_fields(),
                        _ => FieldList::from_node(info, &group_path)?,
                    };
                    groups.push((group.to_string(), fields));
                }
                Ok(Self::Grouped { groups })
            }
            _ => Ok(Self::Flat {
                fields: FieldList::from_node(node, path)?,
            }),
        }
    }

    pub fn group(&self, name: &str) -> Option<&FieldList> {
        match self {
            Self::Flat { .. } => None,
            Self::Grouped { groups } => groups
                .iter()
                .find(|(group, _)| group == name)
                .map(|(_, fields)| fields),
        }
    }

    pub fn total_columns(&self) -> usize {
        match self {
            Self::Flat { fields } => fields.len(),
            Self::Grouped { groups } => groups.iter().map(|(_, f)| f.len()).sum(),
        }
    }
}

pub const DEFAULT_PRICE_FIELDS: [&str; 5] = ["OPEN", "HIGH", "LOW", "CLOSE", "VWAP"];
pub const DEFAULT_ROLLING_WINDOWS: [i64; 5] = [5, 10, 20, 30, 60];

/// Rolling-window operators of the Alpha158 family, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollingOp {
    Roc,
    Ma,
    Std,
    Beta,
    Rsqr,
    Resi,
    Max,
    Low,
    Qtlu,
    Qtld,
    Rank,
    Rsv,
    Imax,
    Imin,
    Imxd,
    Corr,
    Cord,
    Cntp,
    Cntn,
    Cntd,
    Sump,
    Sumn,
    Sumd,
    Vma,
    Vstd,
    Wvma,
    Vsump,
    Vsumn,
    Vsumd,
}

impl RollingOp {
    pub const ALL: [RollingOp; 29] = [
        RollingOp::Roc,
        RollingOp::Ma,
        RollingOp::Std,
        RollingOp::Beta,
        RollingOp::Rsqr,
        RollingOp::Resi,
        RollingOp::Max,
        RollingOp::Low,
        RollingOp::Qtlu,
        RollingOp::Qtld,
        RollingOp::Rank,
        RollingOp::Rsv,
        RollingOp::Imax,
        RollingOp::Imin,
        RollingOp::Imxd,
        RollingOp::Corr,
        RollingOp::Cord,
        RollingOp::Cntp,
        RollingOp::Cntn,
        RollingOp::Cntd,
        RollingOp::Sump,
        RollingOp::Sumn,
        RollingOp::Sumd,
        RollingOp::Vma,
        RollingOp::Vstd,
        RollingOp::Wvma,
        RollingOp::Vsump,
        RollingOp::Vsumn,
        RollingOp::Vsumd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RollingOp::Roc => "ROC",
            RollingOp::Ma => "MA",
            RollingOp::Std => "STD",
            RollingOp::Beta => "BETA",
            RollingOp::Rsqr => "RSQR",
            RollingOp::Resi => "RESI",
            RollingOp::Max => "MAX",
            RollingOp::Low => "LOW",
            RollingOp::Qtlu => "QTLU",
            RollingOp::Qtld => "QTLD",
            RollingOp::Rank => "RANK",
            RollingOp::Rsv => "RSV",
            RollingOp::Imax => "IMAX",
            RollingOp::Imin => "IMIN",
            RollingOp::Imxd => "IMXD",
            RollingOp::Corr => "CORR",
            RollingOp::Cord => "CORD",
            RollingOp::Cntp => "CNTP",
            RollingOp::Cntn => "CNTN",
            RollingOp::Cntd => "CNTD",
            RollingOp::Sump => "SUMP",
            RollingOp::Sumn => "SUMN",
            RollingOp::Sumd => "SUMD",
            RollingOp::Vma => "VMA",
            RollingOp::Vstd => "VSTD",
            RollingOp::Wvma => "WVMA",
            RollingOp::Vsump => "VSUMP",
            RollingOp::Vsumn => "VSUMN",
            RollingOp::Vsumd => "VSUMD",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Column prefix; `LOW` columns are named `MIN`, as qlib does.
    pub fn column(self) -> &'static str {
        match self {
            RollingOp::Low => "MIN",
            other => other.name(),
        }
    }

    pub fn expr(self, d: i64) -> String {
        match self {
            RollingOp::Roc => format!("Ref($close, {d})/$close"),
            RollingOp::Ma => format!("Mean($close, {d})/$close"),
            RollingOp::Std => format!("Std($close, {d})/$close"),
            RollingOp::Beta => format!("Slope($close, {d})/$close"),
            RollingOp::Rsqr => format!("Rsquare($close, {d})"),
            RollingOp::Resi => format!("Resi($close, {d})/$close"),
            RollingOp::Max => format!("Max($high, {d})/$close"),
            RollingOp::Low => format!("Min($low, {d})/$close"),
            RollingOp::Qtlu => format!("Quantile($close, {d}, 0.8)/$close"),
            RollingOp::Qtld => format!("Quantile($close, {d}, 0.2)/$close"),
            RollingOp::Rank => format!("Rank($close, {d})"),
            RollingOp::Rsv => {
                format!("($close-Min($low, {d}))/(Max($high, {d})-Min($low, {d})+1e-12)")
            }
            RollingOp::Imax => format!("IdxMax($high, {d})/{d}"),
            RollingOp::Imin => format!("IdxMin($low, {d})/{d}"),
            RollingOp::Imxd => format!("(IdxMax($high, {d})-IdxMin($low, {d}))/{d}"),
            RollingOp::Corr => format!("Corr($close, Log($volume+1), {d})"),
            RollingOp::Cord => {
                format!("Corr($close/Ref($close,1), Log($volume/Ref($volume, 1)+1), {d})")
            }
            RollingOp::Cntp => format!("Mean($close>Ref($close, 1), {d})"),
            RollingOp::Cntn => format!("Mean($close<Ref($close, 1), {d})"),
            RollingOp::Cntd => {
                format!("Mean($close>Ref($close, 1), {d})-Mean($close<Ref($close, 1), {d})")
            }
            RollingOp::Sump => format!(
                "Sum(Greater($close-Ref($close, 1), 0), {d})/(Sum(Abs($close-Ref($close, 1)), {d})+1e-12)"
            ),
            RollingOp::Sumn => format!(
                "Sum(Greater(Ref($close, 1)-$close, 0), {d})/(Sum(Abs($close-Ref($close, 1)), {d})+1e-12)"
            ),
            RollingOp::Sumd => format!(
                "(Sum(Greater($close-Ref($close, 1), 0), {d})-Sum(Greater(Ref($close, 1)-$close, 0), {d}))/(Sum(Abs($close-Ref($close, 1)), {d})+1e-12)"
            ),
            RollingOp::Vma => format!("Mean($volume, {d})/($volume+1e-12)"),
            RollingOp::Vstd => format!("Std($volume, {d})/($volume+1e-12)"),
            RollingOp::Wvma => format!(
                "Std(Abs($close/Ref($close, 1)-1)*$volume, {d})/(Mean(Abs($close/Ref($close, 1)-1)*$volume, {d})+1e-12)"
            ),
            RollingOp::Vsump => format!(
                "Sum(Greater($volume-Ref($volume, 1), 0), {d})/(Sum(Abs($volume-Ref($volume, 1)), {d})+1e-12)"
            ),
            RollingOp::Vsumn => format!(
                "Sum(Greater(Ref($volume, 1)-$volume, 0), {d})/(Sum(Abs($volume-Ref($volume, 1)), {d})+1e-12)"
            ),
            RollingOp::Vsumd => format!(
                "(Sum(Greater($volume-Ref($volume, 1), 0), {d})-Sum(Greater(Ref($volume, 1)-$volume, 0), {d}))/(Sum(Abs($volume-Ref($volume, 1)), {d})+1e-12)"
            ),
        }
    }
}

const KBAR: [(&str, &str); 9] = [
    ("($close-$open)/$open", "KMID"),
    ("($high-$low)/$open", "KLEN"),
    ("($close-$open)/($high-$low+1e-12)", "KMID2"),
    ("($high-Greater($open, $close))/$open", "KUP"),
    ("($high-Greater($open, $close))/($high-$low+1e-12)", "KUP2"),
    ("(Less($open, $close)-$low)/$open", "KLOW"),
    ("(Less($open, $close)-$low)/($high-$low+1e-12)", "KLOW2"),
    ("(2*$close-$high-$low)/$open", "KSFT"),
    ("(2*$close-$high-$low)/($high-$low+1e-12)", "KSFT2"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSpec {
    pub windows: Vec<i64>,
    pub features: Vec<String>,
}

impl Default for PriceSpec {
    fn default() -> Self {
        Self {
            windows: (0..5).collect(),
            features: DEFAULT_PRICE_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub windows: Vec<i64>,
}

impl Default for VolumeSpec {
    fn default() -> Self {
        Self {
            windows: (0..5).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingSpec {
    pub windows: Vec<i64>,
    /// `None` means every operator.
    pub include: Option<Vec<RollingOp>>,
    pub exclude: Vec<RollingOp>,
}

impl Default for RollingSpec {
    fn default() -> Self {
        Self {
            windows: DEFAULT_ROLLING_WINDOWS.to_vec(),
            include: None,
            exclude: Vec::new(),
        }
    }
}

impl RollingSpec {
    fn uses(&self, op: RollingOp) -> bool {
        !self.exclude.contains(&op)
            && self.include.as_ref().map_or(true, |inc| inc.contains(&op))
    }
}

/// Generator config for the built-in feature families.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSpec {
    pub kbar: bool,
    pub price: Option<PriceSpec>,
    pub volume: Option<VolumeSpec>,
    pub rolling: Option<RollingSpec>,
}

impl FeatureSpec {
    pub fn from_node(node: &Node, path: &str) -> Result<Self, String> {
        let mapping = node
            .as_map()
            .ok_or_else(|| format!("{path}: expected a feature mapping, got {}", node.kind()))?;

        let mut spec = FeatureSpec::default();
        for (key, value) in mapping.iter() {
            let key_path = format!("{path}.{key}");
            let section = match value {
                Node::Null => None,
                Node::Map(section) => Some(section),
                other => {
                    return Err(format!("{key_path}: expected a mapping, got {}", other.kind()))
                }
            };
            let field = |name: &str| section.and_then(|s| s.get(name));

            match key {
                "kbar" => spec.kbar = true,
                "price" => {
                    let mut price = PriceSpec::default();
                    if let Some(windows) = field("windows") {
                        price.windows = windows_from_node(windows, &format!("{key_path}.windows"))?;
                    }
                    if let Some(features) = field("feature") {
                        price.features = string_list(features, &format!("{key_path}.feature"))?;
                    }
                    spec.price = Some(price);
                }
                "volume" => {
                    let mut volume = VolumeSpec::default();
                    if let Some(windows) = field("windows") {
                        volume.windows =
                            windows_from_node(windows, &format!("{key_path}.windows"))?;
                    }
                    spec.volume = Some(volume);
                }
                "rolling" => {
                    let mut rolling = RollingSpec::default();
                    if let Some(windows) = field("windows") {
                        rolling.windows =
                            windows_from_node(windows, &format!("{key_path}.windows"))?;
                    }
                    match field("include") {
                        None | Some(Node::Null) => {}
                        Some(include) => {
                            rolling.include =
                                Some(operator_list(include, &format!("{key_path}.include"))?)
                        }
                    }
                    if let Some(exclude) = field("exclude") {
                        rolling.exclude = operator_list(exclude, &format!("{key_path}.exclude"))?;
                    }
                    spec.rolling = Some(rolling);
                }
                other => {
                    return Err(format!(
                        "{path}: unknown feature family '{other}' (expected kbar, price, volume, rolling)"
                    ))
                }
            }
        }
        Ok(spec)
    }

    pub fn to_fields(&self) -> FieldList {
        let mut out = FieldList::default();
        if self.kbar {
            for (expr, name) in KBAR {
                out.push(expr.to_string(), name.to_string());
            }
        }
        if let Some(price) = &self.price {
            for feature in &price.features {
                let field = feature.to_lowercase();
                for &d in &price.windows {
                    let expr = if d == 0 {
                        format!("${field}/$close")
                    } else {
                        format!("Ref(${field}, {d})/$close")
                    };
                    out.push(expr, format!("{}{d}", field.to_uppercase()));
                }
            }
        }
        if let Some(volume) = &self.volume {
            for &d in &volume.windows {
                let expr = if d == 0 {
                    "$volume/$volume".to_string()
                } else {
                    format!("Ref($volume, {d})/$volume")
                };
                out.push(expr, format!("VOLUME{d}"));
            }
        }
        if let Some(rolling) = &self.rolling {
            for op in RollingOp::ALL {
                if !rolling.uses(op) {
                    continue;
                }
                for &d in &rolling.windows {
                    out.push(op.expr(d), format!("{}{d}", op.column()));
                }
            }
        }
        out
    }
}

/// A list of window sizes, or `N` as shorthand for `0..N`.
fn windows_from_node(node: &Node, path: &str) -> Result<Vec<i64>, String> {
    match node {
        Node::Int(n) if *n >= 0 => Ok((0..*n).collect()),
        Node::Seq(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Node::Int(d) if *d >= 0 => Ok(*d),
                other => Err(format!(
                    "{path}.{idx}: expected a non-negative integer window, got {}",
                    describe(other)
                )),
            })
            .collect(),
        other => Err(format!(
            "{path}: expected a list of windows or a window count, got {}",
            describe(other)
        )),
    }
}

fn operator_list(node: &Node, path: &str) -> Result<Vec<RollingOp>, String> {
    string_list(node, path)?
        .iter()
        .map(|name| {
            RollingOp::from_name(name)
                .ok_or_else(|| format!("{path}: unknown rolling operator '{name}'"))
        })
        .collect()
}

fn describe(node: &Node) -> String {
    match node {
        Node::Int(v) => format!("int {v}"),
        other => other.kind().to_string(),
    }
}
