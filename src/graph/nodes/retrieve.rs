// Retrieve Topic Node
// Queries one classified topic per visit and loops until all are done

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, Transition};
use crate::graph::state::TurnState;
use crate::rag::{self, RetrievedDocument};

pub struct RetrieveTopicNode;

impl RetrieveTopicNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RetrieveTopicNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for RetrieveTopicNode {
    fn id(&self) -> &'static str {
        "retrieve_topic"
    }

    fn name(&self) -> &'static str {
        "Retrieval Dispatcher"
    }

    async fn execute(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let Some(topic) = state.next_topic().map(str::to_string) else {
            return Ok(NodeOutput::Branch(Transition::Generate));
        };

        // Unknown topics are an invariant violation and abort the turn.
        let retriever = ctx
            .registry
            .retriever(&topic)
            .map_err(|e| GraphError::from_rag(self.id(), e))?;

        let documents: Vec<RetrievedDocument> = match retriever {
            None => {
                tracing::warn!("No knowledge store loaded for topic '{}', skipping", topic);
                Vec::new()
            }
            Some(retriever) => match retriever.retrieve(&state.input).await {
                Ok(docs) => docs,
                Err(err) => {
                    tracing::warn!("Retrieval for topic '{}' failed, skipping: {}", topic, err);
                    Vec::new()
                }
            },
        };

        tracing::debug!("Topic '{}' contributed {} documents", topic, documents.len());
        let tagged = documents
            .into_iter()
            .map(|mut doc| {
                doc.topic = topic.clone();
                doc
            })
            .collect();
        rag::accumulate(&mut state.retrieved_context, tagged);
        state.retrieval_index += 1;

        if state.next_topic().is_some() {
            Ok(NodeOutput::Branch(Transition::Retrieve))
        } else {
            Ok(NodeOutput::Branch(Transition::Generate))
        }
    }
}
