//! Typed shapes for the record collections this feed understands.
//!
//! Records come off the wire as raw JSON. Deserializing into [KnownRecord] is the shape check:
//! the `$type` must be one we know, and the required fields must be there. Anything else is
//! left alone by the caller.

use firehose::exports;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "$type")]
pub enum KnownRecord {
    #[serde(rename = "app.bsky.feed.post")]
    Post(PostRecord),
    #[serde(rename = "app.bsky.feed.repost")]
    Repost(SubjectRecord),
    #[serde(rename = "app.bsky.feed.like")]
    Like(SubjectRecord),
    #[serde(rename = "app.bsky.graph.follow")]
    Follow(FollowRecord),
}

impl KnownRecord {
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// The `$type` this record was tagged with.
    pub fn nsid(&self) -> &'static str {
        match self {
            KnownRecord::Post(_) => "app.bsky.feed.post",
            KnownRecord::Repost(_) => "app.bsky.feed.repost",
            KnownRecord::Like(_) => "app.bsky.feed.like",
            KnownRecord::Follow(_) => "app.bsky.graph.follow",
        }
    }

    pub fn as_post(&self) -> Option<&PostRecord> {
        match self {
            KnownRecord::Post(post) => Some(post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub text: String,
    pub created_at: String,
    pub reply: Option<ReplyRef>,
    pub embed: Option<Embed>,
    #[serde(default)]
    pub langs: Vec<String>,
}

impl PostRecord {
    pub fn is_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Alt text of every attached image, including images under a quote post.
    pub fn image_alts(&self) -> Vec<&str> {
        let mut alts = Vec::new();
        if let Some(embed) = &self.embed {
            embed.collect_alts(&mut alts);
        }
        alts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<Image> },
    #[serde(rename = "app.bsky.embed.external")]
    External { external: External },
    #[serde(rename = "app.bsky.embed.record")]
    Record { record: StrongRef },
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia {
        record: RecordEmbed,
        media: Box<Embed>,
    },
    /// video and whatever else comes along
    #[serde(other)]
    Unknown,
}

impl Embed {
    fn collect_alts<'a>(&'a self, alts: &mut Vec<&'a str>) {
        match self {
            Embed::Images { images } => alts.extend(images.iter().map(|i| i.alt.as_str())),
            Embed::RecordWithMedia { media, .. } => media.collect_alts(alts),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordEmbed {
    pub record: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub alt: String,
    pub image: BlobRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct External {
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub thumb: Option<BlobRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub subject: StrongRef,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRecord {
    pub subject: exports::Did,
    pub created_at: String,
}

/// A reference to an uploaded blob.
///
/// Records carry blob refs in two wire forms, the typed one
/// (`{"$type":"blob","ref":{"$link":...},"mimeType":...,"size":...}`) and the older untyped one
/// (`{"cid":...,"mimeType":...}`). Both deserialize to this.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BlobRefWire")]
pub struct BlobRef {
    pub cid: String,
    pub mime_type: String,
    /// bytes. not known for legacy refs
    pub size: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlobRefWire {
    Typed {
        #[serde(rename = "$type")]
        kind: String,
        #[serde(rename = "ref")]
        link: CidLink,
        #[serde(rename = "mimeType")]
        mime_type: String,
        size: u64,
    },
    Legacy {
        cid: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

#[derive(Deserialize)]
struct CidLink {
    #[serde(rename = "$link")]
    link: String,
}

impl TryFrom<BlobRefWire> for BlobRef {
    type Error = String;

    fn try_from(wire: BlobRefWire) -> Result<Self, Self::Error> {
        match wire {
            BlobRefWire::Typed {
                kind,
                link,
                mime_type,
                size,
            } => {
                if kind != "blob" {
                    return Err(format!("expected a blob, found $type {kind:?}"));
                }
                Ok(BlobRef {
                    cid: link.link,
                    mime_type,
                    size: Some(size),
                })
            }
            BlobRefWire::Legacy { cid, mime_type } => Ok(BlobRef {
                cid,
                mime_type,
                size: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_with_images() -> anyhow::Result<()> {
        let raw = r#"{
            "$type":"app.bsky.feed.post",
            "text":"look at this",
            "createdAt":"2025-04-01T16:58:06.154Z",
            "langs":["en"],
            "embed":{"$type":"app.bsky.embed.images","images":[
                {"alt":"an ALF plush","image":{"$type":"blob","ref":{"$link":"bafkreibme22gw2h7y2h7tg2fhqotaqjucnbc24deqo72b6mkl2egezxhvy"},"mimeType":"image/jpeg","size":123456},"aspectRatio":{"width":1,"height":1}},
                {"image":{"cid":"bafkreibme22gw2h7y2h7tg2fhqotaqjucnbc24deqo72b6mkl2egezxhvy","mimeType":"image/png"}}
            ]}
        }"#;
        let record = KnownRecord::from_json(raw).expect("a valid post");
        let post = record.as_post().expect("a post");
        assert_eq!(post.langs, vec!["en".to_string()]);
        assert_eq!(post.image_alts(), vec!["an ALF plush", ""]);
        let Some(Embed::Images { images }) = &post.embed else {
            panic!("expected images");
        };
        assert_eq!(
            images[0].image,
            BlobRef {
                cid: "bafkreibme22gw2h7y2h7tg2fhqotaqjucnbc24deqo72b6mkl2egezxhvy".to_string(),
                mime_type: "image/jpeg".to_string(),
                size: Some(123456),
            }
        );
        assert_eq!(images[1].image.size, None);
        assert_eq!(images[1].image.mime_type, "image/png");
        Ok(())
    }

    #[test]
    fn test_alts_under_quote_posts() {
        let raw = r#"{
            "$type":"app.bsky.feed.post",
            "text":"quoting",
            "createdAt":"2025-04-01T16:58:06.154Z",
            "embed":{"$type":"app.bsky.embed.recordWithMedia",
                "record":{"record":{"uri":"at://did:plc:ai3dzf35cth7s3st7n7jsd7r/app.bsky.feed.post/3llrdsglqdc2s","cid":"bafyreidofvwoqvd2cnzbun6dkzgfucxh57tirf3ohhde7lsvh4fu3jehgy"}},
                "media":{"$type":"app.bsky.embed.images","images":[{"alt":"alt text","image":{"cid":"bafkreibme22gw2h7y2h7tg2fhqotaqjucnbc24deqo72b6mkl2egezxhvy","mimeType":"image/png"}}]}
            }
        }"#;
        let record = KnownRecord::from_json(raw).expect("a valid post");
        assert_eq!(record.as_post().unwrap().image_alts(), vec!["alt text"]);
    }

    #[test]
    fn test_unknown_embeds_are_fine() {
        let raw = r#"{"$type":"app.bsky.feed.post","text":"a video","createdAt":"2025-04-01T16:58:06.154Z","embed":{"$type":"app.bsky.embed.video","video":{}}}"#;
        let record = KnownRecord::from_json(raw).expect("a valid post");
        assert_eq!(record.as_post().unwrap().embed, Some(Embed::Unknown));
    }

    #[test]
    fn test_invalid_records() {
        // no text
        assert!(KnownRecord::from_json(
            r#"{"$type":"app.bsky.feed.post","createdAt":"2025-04-01T16:58:06.154Z"}"#
        )
        .is_none());
        // not a type we know
        assert!(KnownRecord::from_json(
            r#"{"$type":"app.bsky.feed.threadgate","post":"at://x","createdAt":"2025-04-01T16:58:06.154Z"}"#
        )
        .is_none());
        // blob with the wrong type tag
        assert!(KnownRecord::from_json(
            r#"{"$type":"app.bsky.feed.post","text":"x","createdAt":"2025-04-01T16:58:06.154Z","embed":{"$type":"app.bsky.embed.images","images":[{"alt":"","image":{"$type":"nope","ref":{"$link":"x"},"mimeType":"image/png","size":1}}]}}"#
        )
        .is_none());
    }

    #[test]
    fn test_subject_records() {
        let like = KnownRecord::from_json(
            r#"{"$type":"app.bsky.feed.like","subject":{"uri":"at://did:plc:ai3dzf35cth7s3st7n7jsd7r/app.bsky.feed.post/3llrdsglqdc2s","cid":"bafyreidofvwoqvd2cnzbun6dkzgfucxh57tirf3ohhde7lsvh4fu3jehgy"},"createdAt":"2025-04-01T16:58:06.154Z"}"#,
        )
        .expect("a valid like");
        assert_eq!(like.nsid(), "app.bsky.feed.like");
        let follow = KnownRecord::from_json(
            r#"{"$type":"app.bsky.graph.follow","subject":"did:plc:ai3dzf35cth7s3st7n7jsd7r","createdAt":"2025-04-01T16:58:06.154Z"}"#,
        )
        .expect("a valid follow");
        let KnownRecord::Follow(follow) = follow else {
            panic!("expected a follow");
        };
        assert_eq!(follow.subject.as_str(), "did:plc:ai3dzf35cth7s3st7n7jsd7r");
    }
}
