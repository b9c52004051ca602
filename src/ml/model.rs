// ============================================================
// Layer 5 — Span Prediction Encoder
// ============================================================
// A BERT-style transformer encoder with a two-logit span
// head: for every token it scores "answer starts here" and
// "answer ends here".
//
//   ids [B,T] ─▶ token emb + position emb ─▶ N × EncoderLayer
//             ─▶ LayerNorm ─▶ Linear(d_model → 2) ─▶ start, end
//
// Padding positions are masked out of self-attention, so a
// window's logits do not depend on how much padding follows
// it. Unanswerable windows train the classifier position
// (index 0) like any other target.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Devlin et al. (2019) BERT §4.2 (SQuAD)

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Gelu,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

// #[derive(Config)] already provides Clone + serde; adding them again conflicts.
#[derive(Config, Debug)]
pub struct TransformerQaConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    #[config(default = 256)]
    pub d_model:     usize,
    #[config(default = 8)]
    pub num_heads:   usize,
    #[config(default = 6)]
    pub num_layers:  usize,
    #[config(default = 1024)]
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl TransformerQaConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransformerQaModel<B> {
        TransformerQaModel {
            tokens:      EmbeddingConfig::new(self.vocab_size, self.d_model).init(device),
            positions:   EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device),
            layers:      (0..self.num_layers).map(|_| self.init_layer(device)).collect(),
            norm:        LayerNormConfig::new(self.d_model).init(device),
            span_head:   LinearConfig::new(self.d_model, 2).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
            max_seq_len: self.max_seq_len,
        }
    }

    fn init_layer<B: Backend>(&self, device: &B::Device) -> EncoderLayer<B> {
        EncoderLayer {
            attention: MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            attn_norm: LayerNormConfig::new(self.d_model).init(device),
            ffn: FeedForward {
                expand:   LinearConfig::new(self.d_model, self.d_ff).init(device),
                contract: LinearConfig::new(self.d_ff, self.d_model).init(device),
                gelu:     Gelu::new(),
            },
            ffn_norm:  LayerNormConfig::new(self.d_model).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Position-wise d_model → d_ff → d_model projection
#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    pub expand:   Linear<B>,
    pub contract: Linear<B>,
    pub gelu:     Gelu,
}

impl<B: Backend> FeedForward<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.contract.forward(self.gelu.forward(self.expand.forward(x)))
    }
}

/// Post-norm encoder layer: attention and feed-forward, each
/// wrapped in dropout + residual + LayerNorm
#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    pub attention: MultiHeadAttention<B>,
    pub attn_norm: LayerNorm<B>,
    pub ffn:       FeedForward<B>,
    pub ffn_norm:  LayerNorm<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> EncoderLayer<B> {
    /// `pad_mask` [B,T] is true on padding tokens
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attended = self
            .attention
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.attn_norm.forward(x + self.dropout.forward(attended));

        let projected = self.ffn.forward(x.clone());
        self.ffn_norm.forward(x + self.dropout.forward(projected))
    }
}

#[derive(Module, Debug)]
pub struct TransformerQaModel<B: Backend> {
    pub tokens:      Embedding<B>,
    pub positions:   Embedding<B>,
    pub layers:      Vec<EncoderLayer<B>>,
    pub norm:        LayerNorm<B>,
    pub span_head:   Linear<B>,
    pub dropout:     Dropout,
    pub max_seq_len: usize,
}

/// Per-token span scores, both [batch, seq_len]
pub struct QaModelOutput<B: Backend> {
    pub start_logits: Tensor<B, 2>,
    pub end_logits:   Tensor<B, 2>,
}

impl<B: Backend> TransformerQaModel<B> {
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>, pad_mask: Tensor<B, 2, Bool>) -> QaModelOutput<B> {
        let [batch, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let position_ids = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch, seq_len]);
        let embedded = self.tokens.forward(input_ids) + self.positions.forward(position_ids);

        let hidden = self
            .layers
            .iter()
            .fold(self.dropout.forward(embedded), |h, layer| layer.forward(h, pad_mask.clone()));
        let scores = self.span_head.forward(self.norm.forward(hidden)); // [B, T, 2]

        let pick = |i: usize| {
            scores
                .clone()
                .slice([0..batch, 0..seq_len, i..i + 1])
                .reshape([batch, seq_len])
        };
        QaModelOutput { start_logits: pick(0), end_logits: pick(1) }
    }

    /// Mean of start and end cross-entropy over the batch
    pub fn forward_loss(
        &self,
        input_ids:       Tensor<B, 2, Int>,
        pad_mask:        Tensor<B, 2, Bool>,
        start_positions: Tensor<B, 1, Int>,
        end_positions:   Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, QaModelOutput<B>) {
        let output = self.forward(input_ids, pad_mask);
        let ce = CrossEntropyLossConfig::new().init(&output.start_logits.device());
        let start_loss = ce.forward(output.start_logits.clone(), start_positions);
        let end_loss   = ce.forward(output.end_logits.clone(), end_positions);
        ((start_loss + end_loss) / 2.0, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_overrides() {
        let cfg = TransformerQaConfig::new(1000, 128).with_num_layers(2);
        assert_eq!(cfg.d_model, 256);
        assert_eq!(cfg.num_heads, 8);
        assert_eq!(cfg.num_layers, 2);
        assert_eq!(cfg.max_seq_len, 128);
    }

    #[test]
    fn test_config_json_round_trip_through_file() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model_config.json");
        TransformerQaConfig::new(30, 16).with_d_ff(64).save(&path).unwrap();

        let loaded = TransformerQaConfig::load(&path).unwrap();
        assert_eq!(loaded.vocab_size, 30);
        assert_eq!(loaded.d_ff, 64);
    }
}
