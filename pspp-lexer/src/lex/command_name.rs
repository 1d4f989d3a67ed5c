// PSPP - a program for statistical analysis.
// Copyright (C) 2025 Free Software Foundation, Inc.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Command names, for detecting the start of a command in
//! [Auto](crate::lex::segment::Syntax::Auto) syntax.  In that mode, a line
//! with no leading white space starts a new command if it begins with the name
//! of a known command.

use crate::identifier::id_match_n_nonstatic;

/// How a string matches the name of a command.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Match {
    /// True if none of the words in the command name were abbreviated.
    pub exact: bool,

    /// Positive: the number of words missing from the end of the string.
    /// Negative: the number of extra words at the end of the string.  Zero:
    /// the words correspond one to one.
    pub missing_words: isize,
}

/// Compares `string` obtained from the user against the full name of a
/// `command`, word by word.  Each word in `string` must match the
/// corresponding word in `command`, abbreviated to no fewer than 3 letters.
pub fn command_match(command: &str, string: &str) -> Option<Match> {
    let mut command_words = command.split_whitespace();
    let mut string_words = string.split_whitespace();
    let mut exact = true;
    loop {
        let (cw, sw) = match (command_words.next(), string_words.next()) {
            (Some(cw), Some(sw)) => (cw, sw),
            (None, sw) => {
                let extra = sw.map_or(0, |_| 1 + string_words.count());
                return Some(Match {
                    exact,
                    missing_words: -(extra as isize),
                });
            }
            (Some(_), None) => {
                return Some(Match {
                    exact,
                    missing_words: 1 + command_words.count() as isize,
                });
            }
        };
        if !id_match_n_nonstatic(cw, sw, 3) {
            return None;
        }
        exact &= sw.len() >= cw.len();
    }
}

/// List of all PSPP command names.
///
/// This includes commands that are not yet implemented.
pub const COMMAND_NAMES: &[&str] = &[
    "2SLS",
    "ACF",
    "ADD DOCUMENT",
    "ADD FILES",
    "ADD VALUE LABELS",
    "AGGREGATE",
    "ALSCAL",
    "ANACOR",
    "ANOVA",
    "APPLY DICTIONARY",
    "AUTORECODE",
    "BEGIN DATA",
    "BREAK",
    "CACHE",
    "CASEPLOT",
    "CASESTOVARS",
    "CATPCA",
    "CATREG",
    "CCF",
    "CD",
    "CLEAR TRANSFORMATIONS",
    "CLOSE FILE HANDLE",
    "CLUSTER",
    "COMPUTE",
    "CONJOINT",
    "CORRELATIONS",
    "CORRESPONDENCE",
    "COUNT",
    "COXREG",
    "CREATE",
    "CROSSTABS",
    "CSDESCRIPTIVES",
    "CSGLM",
    "CSLOGISTIC",
    "CSPLAN",
    "CSSELECT",
    "CSTABULATE",
    "CTABLES",
    "CURVEFIT",
    "DATA LIST",
    "DATAFILE ATTRIBUTE",
    "DATASET ACTIVATE",
    "DATASET CLOSE",
    "DATASET COPY",
    "DATASET DECLARE",
    "DATASET DISPLAY",
    "DATASET NAME",
    "DATE",
    "DEBUG EVALUATE",
    "DEBUG EXPAND",
    "DEBUG FLOAT FORMAT",
    "DEBUG FORMAT GUESSER",
    "DEBUG MATRIX READ",
    "DEBUG MOMENTS",
    "DEBUG PAPER SIZE",
    "DEBUG POOL",
    "DEBUG XFORM FAIL",
    "DEFINE",
    "DELETE VARIABLES",
    "DESCRIPTIVES",
    "DETECTANOMALY",
    "DISCRIMINANT",
    "DISPLAY MACROS",
    "DISPLAY VARIABLE SETS",
    "DISPLAY",
    "DO IF",
    "DO REPEAT",
    "DOCUMENT",
    "DROP DOCUMENTS",
    "ECHO",
    "EDIT",
    "ELSE IF",
    "ELSE",
    "END CASE",
    "END FILE TYPE",
    "END FILE",
    "END IF",
    "END LOOP",
    "END REPEAT",
    "ERASE",
    "EXAMINE",
    "EXECUTE",
    "EXIT",
    "EXPORT",
    "FACTOR",
    "FILE HANDLE",
    "FILE LABEL",
    "FILE TYPE",
    "FILTER",
    "FINISH",
    "FIT",
    "FLIP",
    "FORMATS",
    "FREQUENCIES",
    "GENLOG",
    "GET DATA",
    "GET TRANSLATE",
    "GET",
    "GGRAPH",
    "GLM",
    "GRAPH",
    "HILOGLINEAR",
    "HOMALS",
    "HOST",
    "IF",
    "IGRAPH",
    "IMPORT",
    "INCLUDE",
    "INFO",
    "INPUT PROGRAM",
    "INSERT",
    "KEYED DATA LIST",
    "KM",
    "LEAVE",
    "LIST",
    "LOGISTIC REGRESSION",
    "LOGLINEAR",
    "LOOP",
    "MANOVA",
    "MAPS",
    "MATCH FILES",
    "MATRIX DATA",
    "MATRIX",
    "MCONVERT",
    "MEANS",
    "MISSING VALUES",
    "MIXED",
    "MODEL CLOSE",
    "MODEL HANDLE",
    "MODEL LIST",
    "MODEL NAME",
    "MRSETS",
    "MULT RESPONSE",
    "MULTIPLE CORRESPONDENCE",
    "MVA",
    "N OF CASES",
    "N",
    "NAIVEBAYES",
    "NEW FILE",
    "NLR",
    "NOMREG",
    "NONPAR CORR",
    "NPAR TESTS",
    "NUMBERED",
    "NUMERIC",
    "OLAP CUBES",
    "OMS",
    "ONEWAY",
    "ORTHOPLAN",
    "OUTPUT MODIFY",
    "OVERALS",
    "PACF",
    "PARTIAL CORR",
    "PEARSON CORRELATIONS",
    "PERMISSIONS",
    "PLANCARDS",
    "PLUM",
    "POINT",
    "PPLOT",
    "PREDICT",
    "PREFSCAL",
    "PRESERVE",
    "PRINCALS",
    "PRINT EJECT",
    "PRINT FORMATS",
    "PRINT SPACE",
    "PRINT",
    "PROBIT",
    "PROCEDURE OUTPUT",
    "PROXIMITIES",
    "PROXSCAL",
    "Q",
    "QUICK CLUSTER",
    "QUIT",
    "RANK",
    "RATIO STATISTICS",
    "READ MODEL",
    "RECODE",
    "RECORD TYPE",
    "REFORMAT",
    "REGRESSION",
    "RELIABILITY",
    "RENAME VARIABLES",
    "REPEATING DATA",
    "REPORT",
    "REREAD",
    "RESTORE",
    "RMV",
    "ROC",
    "SAMPLE",
    "SAVE DATA COLLECTION",
    "SAVE TRANSLATE",
    "SAVE",
    "SCRIPT",
    "SEASON",
    "SELECT IF",
    "SELECTPRED",
    "SET",
    "SHOW",
    "SORT CASES",
    "SORT VARIABLES",
    "SPCHART",
    "SPECTRA",
    "SPLIT FILE",
    "STEMLEAF",
    "STRING",
    "SUBTITLE",
    "SUMMARIZE",
    "SURVIVAL",
    "SYSFILE INFO",
    "T-TEST",
    "TDISPLAY",
    "TEMPORARY",
    "TITLE",
    "TREE",
    "TSAPPLY",
    "TSET",
    "TSHOW",
    "TSMODEL",
    "TSPLOT",
    "TWOSTEP CLUSTER",
    "UNIANOVA",
    "UNNUMBERED",
    "UPDATE",
    "USE",
    "VALIDATEDATA",
    "VALUE LABELS",
    "VARCOMP",
    "VARIABLE ALIGNMENT",
    "VARIABLE ATTRIBUTE",
    "VARIABLE LABELS",
    "VARIABLE LEVEL",
    "VARIABLE ROLE",
    "VARIABLE WIDTH",
    "VARSTOCASES",
    "VECTOR",
    "VERIFY",
    "WEIGHT",
    "WLS",
    "WRITE FORMATS",
    "WRITE",
    "XEXPORT",
    "XGRAPH",
    "XSAVE",
];

#[cfg(test)]
mod tests {
    use super::{command_match, Match, COMMAND_NAMES};

    #[test]
    fn names_are_sorted() {
        assert!(COMMAND_NAMES.windows(2).all(|w| w[0].chars().next() <= w[1].chars().next()));
    }

    #[test]
    fn matching() {
        assert_eq!(
            command_match("DATA LIST", "data list"),
            Some(Match {
                exact: true,
                missing_words: 0
            })
        );
        assert_eq!(
            command_match("DATA LIST", "dat"),
            Some(Match {
                exact: false,
                missing_words: 1
            })
        );
        assert_eq!(
            command_match("LIST", "list x y"),
            Some(Match {
                exact: true,
                missing_words: -2
            })
        );
        assert_eq!(command_match("LIST", "li"), None);
    }
}
