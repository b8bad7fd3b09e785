//! 文本差异模块
//!
//! 基于最长公共子序列的逐行差异：统一差异文本、对齐的并排视图、变更统计，
//! 以及两个OPF之间的元数据变更摘要。不做任何I/O。

use std::ops::Range;

use serde::Serialize;

use crate::epub::config::{EpubsmithConfig, NormalizeConfig};
use crate::epub::opf::{self, OpfFacts};

/// 默认上下文行数
pub const DEFAULT_CONTEXT: usize = 3;

/// 差异操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// 一段差异操作，`old`/`new` 为行下标区间
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub old: Range<usize>,
    pub new: Range<usize>,
}

impl Opcode {
    fn new(tag: OpTag, old: Range<usize>, new: Range<usize>) -> Self {
        Self { tag, old, new }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Remove,
    Add,
}

/// 计算两组行之间的操作序列
///
/// 先剥掉公共前缀与后缀，只对中间不同的区域建LCS表，
/// 内存为 O(n·m)，其中 n、m 是该区域的行数。
/// OPF的改动通常集中在metadata附近，中间区域很小。
pub fn opcodes(old: &[&str], new: &[&str]) -> Vec<Opcode> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut steps = vec![Step::Keep; prefix];
    steps.extend(lcs_steps(
        &old[prefix..old.len() - suffix],
        &new[prefix..new.len() - suffix],
    ));
    steps.extend(std::iter::repeat_n(Step::Keep, suffix));

    let mut codes = Vec::new();
    let (mut i, mut j) = (0, 0);
    let mut index = 0;
    while index < steps.len() {
        let (start_i, start_j) = (i, j);
        if steps[index] == Step::Keep {
            while index < steps.len() && steps[index] == Step::Keep {
                i += 1;
                j += 1;
                index += 1;
            }
            codes.push(Opcode::new(OpTag::Equal, start_i..i, start_j..j));
            continue;
        }
        while index < steps.len() && steps[index] != Step::Keep {
            match steps[index] {
                Step::Remove => i += 1,
                _ => j += 1,
            }
            index += 1;
        }
        let tag = match (i > start_i, j > start_j) {
            (true, true) => OpTag::Replace,
            (true, false) => OpTag::Delete,
            _ => OpTag::Insert,
        };
        codes.push(Opcode::new(tag, start_i..i, start_j..j));
    }
    codes
}

/// 对两段行做LCS回溯，得到逐行步骤
fn lcs_steps(old: &[&str], new: &[&str]) -> Vec<Step> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = old[i..] 与 new[j..] 的最长公共子序列长度
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            steps.push(Step::Keep);
            i += 1;
            j += 1;
        } else if j == m || (i < n && lcs[i + 1][j] >= lcs[i][j + 1]) {
            steps.push(Step::Remove);
            i += 1;
        } else {
            steps.push(Step::Add);
            j += 1;
        }
    }
    steps
}

/// 按上下文行数把操作序列切分成块
fn grouped_opcodes(codes: &[Opcode], context: usize) -> Vec<Vec<Opcode>> {
    let mut codes = codes.to_vec();
    if codes.is_empty() {
        return Vec::new();
    }
    if let Some(first) = codes.first_mut() {
        if first.tag == OpTag::Equal {
            first.old.start = first.old.start.max(first.old.end.saturating_sub(context));
            first.new.start = first.new.start.max(first.new.end.saturating_sub(context));
        }
    }
    if let Some(last) = codes.last_mut() {
        if last.tag == OpTag::Equal {
            last.old.end = last.old.end.min(last.old.start + context);
            last.new.end = last.new.end.min(last.new.start + context);
        }
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for mut code in codes {
        if code.tag == OpTag::Equal && code.old.len() > context * 2 {
            group.push(Opcode::new(
                OpTag::Equal,
                code.old.start..code.old.start + context,
                code.new.start..code.new.start + context,
            ));
            groups.push(std::mem::take(&mut group));
            code.old.start = code.old.start.max(code.old.end - context);
            code.new.start = code.new.start.max(code.new.end - context);
        }
        group.push(code);
    }
    let only_equal = group.len() == 1 && group[0].tag == OpTag::Equal;
    if !group.is_empty() && !only_equal {
        groups.push(group);
    }
    groups
        .into_iter()
        .filter(|g| g.iter().any(|c| c.tag != OpTag::Equal))
        .collect()
}

fn format_range(range: &Range<usize>) -> String {
    match range.len() {
        0 => format!("{},0", range.start),
        1 => format!("{}", range.start + 1),
        len => format!("{},{}", range.start + 1, len),
    }
}

/// 生成统一差异文本
///
/// 两侧相同时返回空串。
pub fn unified_diff(old: &str, new: &str, label: &str) -> String {
    unified_diff_with_context(old, new, label, DEFAULT_CONTEXT)
}

pub fn unified_diff_with_context(old: &str, new: &str, label: &str, context: usize) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let groups = grouped_opcodes(&opcodes(&old_lines, &new_lines), context);
    if groups.is_empty() {
        return String::new();
    }

    let mut output = format!("--- a/{}\n+++ b/{}\n", label, label);
    for group in groups {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old.start..last.old.end;
        let new_range = first.new.start..last.new.end;
        output.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(&old_range),
            format_range(&new_range)
        ));
        for code in &group {
            if code.tag == OpTag::Equal {
                for line in &old_lines[code.old.clone()] {
                    output.push_str(&format!(" {}\n", line));
                }
                continue;
            }
            if matches!(code.tag, OpTag::Replace | OpTag::Delete) {
                for line in &old_lines[code.old.clone()] {
                    output.push_str(&format!("-{}\n", line));
                }
            }
            if matches!(code.tag, OpTag::Replace | OpTag::Insert) {
                for line in &new_lines[code.new.clone()] {
                    output.push_str(&format!("+{}\n", line));
                }
            }
        }
    }
    output
}

/// 并排视图中的一行，`None` 表示该侧没有对应行
pub type SideBySideRow = (Option<String>, Option<String>);

/// 生成对齐的并排视图
pub fn side_by_side(old: &str, new: &str) -> Vec<SideBySideRow> {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let mut rows = Vec::new();

    for code in opcodes(&old_lines, &new_lines) {
        let left = &old_lines[code.old.clone()];
        let right = &new_lines[code.new.clone()];
        match code.tag {
            OpTag::Equal => {
                for (a, b) in left.iter().zip(right) {
                    rows.push((Some(a.to_string()), Some(b.to_string())));
                }
            }
            OpTag::Replace => {
                for k in 0..left.len().max(right.len()) {
                    rows.push((
                        left.get(k).map(|s| s.to_string()),
                        right.get(k).map(|s| s.to_string()),
                    ));
                }
            }
            OpTag::Delete => rows.extend(left.iter().map(|s| (Some(s.to_string()), None))),
            OpTag::Insert => rows.extend(right.iter().map(|s| (None, Some(s.to_string())))),
        }
    }
    rows
}

/// 并排视图的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

impl DiffStats {
    pub fn from_rows(rows: &[SideBySideRow]) -> Self {
        let mut stats = DiffStats::default();
        for row in rows {
            match row {
                (None, Some(_)) => stats.added += 1,
                (Some(_), None) => stats.removed += 1,
                (Some(a), Some(b)) if a != b => stats.changed += 1,
                _ => {}
            }
        }
        stats
    }
}

/// 两个OPF之间的元数据变更摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpfChangeSummary {
    pub title_changed: bool,
    pub creator_changed: bool,
    pub publisher_changed: bool,
    pub description_changed: bool,
    /// 封面meta的有无发生变化
    pub cover_changed: bool,
    /// 厂商元数据从有变为无
    pub vendor_metadata_removed: bool,
}

impl OpfChangeSummary {
    pub fn any(&self) -> bool {
        self.title_changed
            || self.creator_changed
            || self.publisher_changed
            || self.description_changed
            || self.cover_changed
            || self.vendor_metadata_removed
    }
}

/// 使用默认厂商规则比较两个OPF
pub fn opf_change_summary(old: &str, new: &str) -> OpfChangeSummary {
    opf_change_summary_with(old, new, &EpubsmithConfig::shared_default().normalize)
}

/// 比较两个OPF的元数据事实，无法解析的一侧视为没有任何事实
pub fn opf_change_summary_with(old: &str, new: &str, config: &NormalizeConfig) -> OpfChangeSummary {
    let facts = |text: &str| -> OpfFacts {
        opf::extract_facts(text, config).unwrap_or_else(|e| {
            tracing::debug!("OPF无法解析，按空事实处理: {}", e);
            OpfFacts::default()
        })
    };
    let (before, after) = (facts(old), facts(new));

    OpfChangeSummary {
        title_changed: before.title != after.title,
        creator_changed: before.creators != after.creators,
        publisher_changed: before.publisher != after.publisher,
        description_changed: before.description != after.description,
        cover_changed: before.has_cover_meta != after.has_cover_meta,
        vendor_metadata_removed: before.has_vendor_metadata && !after.has_vendor_metadata,
    }
}
