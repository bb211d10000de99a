// Plain-text result output: one consensus per line, or one aligned row per
// line for MSA output, optionally followed by each graph in DOT format.

use std::io::{self, Write};

use crate::pipelines::batched::sink::{FlushReport, GroupOutput, ResultSink};

pub struct ResultWriter<W: Write> {
    out: W,
    print: bool,
    print_graph: bool,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(out: W, print: bool, print_graph: bool) -> Self {
        Self {
            out,
            print,
            print_graph,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for ResultWriter<W> {
    fn on_flush(&mut self, report: &FlushReport) -> io::Result<()> {
        if self.print {
            for result in &report.results {
                match &result.outcome {
                    Ok(GroupOutput::Consensus { sequence, .. }) => {
                        writeln!(self.out, "{}", sequence)?;
                    }
                    Ok(GroupOutput::Msa { alignments }) => {
                        for row in alignments {
                            writeln!(self.out, "{}", row)?;
                        }
                    }
                    Err(_) => {}
                }
            }
        }
        if self.print_graph {
            for graph in &report.graphs {
                writeln!(self.out, "{}", graph.serialize_to_dot())?;
            }
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::DirectedGraph;
    use crate::core::types::Status;
    use crate::pipelines::batched::sink::{GroupResult, HarvestError};

    fn report() -> FlushReport {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node(b'A');
        let c = graph.add_node(b'C');
        graph.add_edge(a, c, 2);
        FlushReport {
            batch: 0,
            first: 0,
            last: 2,
            results: vec![
                GroupResult {
                    group_id: 0,
                    outcome: Ok(GroupOutput::Consensus {
                        sequence: "ACGT".to_string(),
                        coverage: vec![2, 2, 2, 1],
                    }),
                },
                GroupResult {
                    group_id: 1,
                    outcome: Err(HarvestError::Engine(Status::OtherAddFailure)),
                },
                GroupResult {
                    group_id: 2,
                    outcome: Ok(GroupOutput::Msa {
                        alignments: vec!["AC-".to_string(), "ACG".to_string()],
                    }),
                },
            ],
            graphs: vec![graph],
            warning: None,
        }
    }

    #[test]
    fn test_print_skips_failed_groups() {
        let mut writer = ResultWriter::new(Vec::new(), true, false);
        writer.on_flush(&report()).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "ACGT\nAC-\nACG\n");
    }

    #[test]
    fn test_graph_only_output() {
        let mut writer = ResultWriter::new(Vec::new(), false, true);
        writer.on_flush(&report()).unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert!(text.starts_with("digraph graphname {"));
        assert!(text.contains("0 -> 1 [label=\"2\"];"));
    }

    #[test]
    fn test_silent_by_default() {
        let mut writer = ResultWriter::new(Vec::new(), false, false);
        writer.on_flush(&report()).unwrap();
        assert!(writer.into_inner().is_empty());
    }
}
