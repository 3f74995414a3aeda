//! The service stack: network, cluster, image repository, container task
//! and a scheduled function
//!
//! Everything here is declaration only. Teardown behaviour is left to the
//! [`DeletionPolicySetter`](stk_construct::DeletionPolicySetter) aspect the
//! provisioner registers afterwards.

use crate::config::StackConfig;
use serde_json::{json, Value};
use stk_artifact::ArtifactRef;
use stk_construct::prelude::*;

const SSM_MANAGED_POLICY: &str = "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";

/// `{"Ref": <logical id>}` for a declared node
fn reference(builder: &StackBuilder, id: NodeId) -> Result<Value, ConstructError> {
    let path = builder.path(id).ok_or(ConstructError::UnknownNode(id))?;
    Ok(json!({ "Ref": path.logical_id() }))
}

/// `{"Fn::GetAtt": [<logical id>, <attribute>]}` for a declared node
fn attribute(builder: &StackBuilder, id: NodeId, name: &str) -> Result<Value, ConstructError> {
    let path = builder.path(id).ok_or(ConstructError::UnknownNode(id))?;
    Ok(json!({ "Fn::GetAtt": [path.logical_id(), name] }))
}

fn environment(vars: impl IntoIterator<Item = (String, Value)>) -> Value {
    Value::Array(
        vars.into_iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect(),
    )
}

/// Declare the service stack for an already published image
///
/// The task definition references `artifact` by its fingerprint tag, so the
/// plan always points at exactly the content that was published.
///
/// # Errors
/// Fails if the stack name is not a valid construct id
pub fn define_stack(
    config: &StackConfig,
    artifact: &ArtifactRef,
) -> Result<StackBuilder, ConstructError> {
    let mut b = StackBuilder::new(&config.stack_name)?;
    let root = b.root();

    let secret_arns: Vec<String> = config
        .secret_parameters
        .iter()
        .map(|name| format!("arn:aws:ssm:{}:*:parameter{name}", config.region))
        .collect();
    let secrets = b.add(
        root,
        "AllowGetSecureString",
        CfnResource::new("AWS::IAM::ManagedPolicy").with_property(
            "PolicyDocument",
            json!({
                "Statement": [{
                    "Effect": "Allow",
                    "Action": ["ssm:GetParameters"],
                    "Resource": secret_arns,
                }]
            }),
        ),
    )?;
    let secrets_ref = reference(&b, secrets)?;

    // Network: a public and a private subnet per zone, one NAT instance
    // in the first public subnet
    let network = b.add(root, "Vpc", Group::new())?;
    let vpc = b.add(
        network,
        "Resource",
        CfnResource::new("AWS::EC2::VPC")
            .with_property("CidrBlock", "10.0.0.0/16")
            .with_property("EnableDnsHostnames", true)
            .with_property("EnableDnsSupport", true),
    )?;
    let vpc_ref = reference(&b, vpc)?;

    let mut nat = None;
    let mut private_groups = Vec::new();
    for az in 0..config.network.max_azs {
        let public = b.add(network, &format!("PublicSubnet{}", az + 1), Group::new())?;
        let public_subnet = b.add(
            public,
            "Subnet",
            CfnResource::new("AWS::EC2::Subnet")
                .with_property("VpcId", vpc_ref.clone())
                .with_property("AvailabilityZoneIndex", az)
                .with_property("CidrBlock", format!("10.0.{}.0/20", az * 32))
                .with_property("MapPublicIpOnLaunch", true),
        )?;
        b.add_dependency(public, vpc)?;

        if nat.is_none() {
            let instance = b.add(
                public,
                "NatInstance",
                CfnResource::new("AWS::EC2::Instance")
                    .with_property("InstanceType", config.network.nat_instance_type.as_str())
                    .with_property("SourceDestCheck", false)
                    .with_property("SubnetId", reference(&b, public_subnet)?)
                    .with_property("ManagedPolicyArns", json!([SSM_MANAGED_POLICY])),
            )?;
            b.add_dependency(instance, public_subnet)?;
            nat = Some(instance);
        }

        let private = b.add(network, &format!("PrivateSubnet{}", az + 1), Group::new())?;
        private_groups.push(private);
        b.add(
            private,
            "Subnet",
            CfnResource::new("AWS::EC2::Subnet")
                .with_property("VpcId", vpc_ref.clone())
                .with_property("AvailabilityZoneIndex", az)
                .with_property("CidrBlock", format!("10.0.{}.0/20", az * 32 + 16))
                .with_property("MapPublicIpOnLaunch", false),
        )?;
        b.add_dependency(private, vpc)?;
    }
    if let Some(nat) = nat {
        let nat_ref = reference(&b, nat)?;
        for private in private_groups {
            let subnet_path = b
                .path(private)
                .map(|p| p.child("Subnet").logical_id())
                .ok_or(ConstructError::UnknownNode(private))?;
            b.add(
                private,
                "DefaultRoute",
                CfnResource::new("AWS::EC2::Route")
                    .with_property("SubnetId", json!({ "Ref": subnet_path }))
                    .with_property("DestinationCidrBlock", "0.0.0.0/0")
                    .with_property("InstanceId", nat_ref.clone()),
            )?;
            b.add_dependency(private, nat)?;
        }
    }

    let cluster = b.add(root, "Cluster", CfnResource::new("AWS::ECS::Cluster"))?;
    b.add_dependency(cluster, network)?;

    let repository = b.add(
        root,
        "Repository",
        Repository::new(&config.image.repository)
            .with_lifecycle_rule(LifecycleRule::keep_last(config.image.max_image_count)),
    )?;

    let image = b.add(
        root,
        "ImageDeploy",
        ImageDeployment::new(&config.image.source_dir, artifact.clone()),
    )?;
    b.add_dependency(image, repository)?;

    // Task definition with its role and container log group
    let task = b.add(root, "TaskDefinition", Group::new())?;
    let task_role = b.add(
        task,
        "TaskRole",
        CfnResource::new("AWS::IAM::Role")
            .with_property(
                "AssumeRolePolicyDocument",
                json!({
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": "sts:AssumeRole",
                        "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                    }]
                }),
            )
            .with_property("ManagedPolicyArns", json!([secrets_ref])),
    )?;
    let task_role_ref = reference(&b, task_role)?;
    let log_group = b.add(
        task,
        "LogGroup",
        CfnResource::new("AWS::Logs::LogGroup").with_property("RetentionInDays", 30),
    )?;
    let log_group_ref = reference(&b, log_group)?;
    let container_env = config
        .task
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
        .chain(std::iter::once(("LOG_GROUP_NAME".to_string(), log_group_ref.clone())));
    let task_def = b.add(
        task,
        "Resource",
        CfnResource::new("AWS::ECS::TaskDefinition")
            .with_property("RequiresCompatibilities", json!(["FARGATE"]))
            .with_property("NetworkMode", "awsvpc")
            .with_property("Memory", config.task.memory_mib.to_string())
            .with_property("Cpu", config.task.cpu.to_string())
            .with_property("TaskRoleArn", attribute(&b, task_role, "Arn")?)
            .with_property(
                "ContainerDefinitions",
                json!([{
                    "Name": config.task.container_name,
                    "Image": artifact.image_uri(),
                    "Essential": true,
                    "Environment": environment(container_env),
                    "LogConfiguration": {
                        "LogDriver": "awslogs",
                        "Options": {
                            "awslogs-group": log_group_ref,
                            "awslogs-region": config.region,
                            "awslogs-stream-prefix": config.task.container_name,
                        }
                    }
                }]),
            ),
    )?;
    b.add_dependency(task_def, log_group)?;
    b.add_dependency(task_def, task_role)?;
    b.add_dependency(task, image)?;
    b.add_dependency(task, secrets)?;

    // The container reads its own log streams
    let log_group_arn = attribute(&b, log_group, "Arn")?;
    let log_read = b.add(
        root,
        "LogReadPolicy",
        CfnResource::new("AWS::IAM::Policy")
            .with_property(
                "PolicyDocument",
                json!({
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": ["logs:DescribeLogStreams", "logs:GetLogEvents"],
                        "Resource": log_group_arn,
                    }]
                }),
            )
            .with_property("Roles", json!([task_role_ref])),
    )?;
    b.add_dependency(log_read, log_group)?;
    b.add_dependency(log_read, task_role)?;

    let service = b.add(
        root,
        "Service",
        CfnResource::new("AWS::ECS::Service")
            .with_property("Cluster", reference(&b, cluster)?)
            .with_property("TaskDefinition", reference(&b, task_def)?)
            .with_property("DesiredCount", 1)
            .with_property(
                "CapacityProviderStrategy",
                json!([
                    { "CapacityProvider": "FARGATE", "Base": 0, "Weight": 0 },
                    { "CapacityProvider": "FARGATE_SPOT", "Base": 1, "Weight": 1 },
                ]),
            ),
    )?;
    b.add_dependency(service, cluster)?;
    b.add_dependency(service, task)?;
    b.add_dependency(service, log_read)?;

    // Scheduled function
    let mut function_env = config.schedule.environment.clone();
    if let Some(parameter) = &config.schedule.channel_parameter {
        function_env.insert("CHANNEL_ID".into(), format!("{{{{resolve:ssm:{parameter}}}}}"));
    }
    let function = b.add(
        root,
        "PostIndicatorsFunction",
        CfnResource::new("AWS::Lambda::Function")
            .with_property("Runtime", config.schedule.runtime.as_str())
            .with_property("Handler", config.schedule.handler.as_str())
            .with_property("Code", config.schedule.function_entry.display().to_string())
            .with_property("MemorySize", config.schedule.function_memory_mib)
            .with_property("ManagedPolicyArns", json!([secrets_ref]))
            .with_property(
                "Environment",
                json!({ "Variables": function_env }),
            ),
    )?;
    b.add_dependency(function, secrets)?;
    let function_ref = reference(&b, function)?;

    let rule = b.add(
        root,
        "Rule",
        CfnResource::new("AWS::Events::Rule")
            .with_property("ScheduleExpression", format!("cron({})", config.schedule.cron))
            .with_property("State", "ENABLED")
            .with_property("Targets", json!([{ "Id": "Target0", "Arn": function_ref }])),
    )?;
    b.add_dependency(rule, function)?;

    tracing::debug!(stack = %b.name(), nodes = b.node_count(), "stack declared");
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stk_artifact::{Fingerprint, RegistryRef};

    fn artifact() -> ArtifactRef {
        RegistryRef::new("localhost", "service/chatbot").artifact(Fingerprint::of_bytes(b"image"))
    }

    fn plan(config: &StackConfig) -> DeploymentPlan {
        define_stack(config, &artifact())
            .unwrap()
            .build()
            .synthesize()
            .unwrap()
            .plan
    }

    #[test]
    fn task_image_is_the_fingerprinted_artifact() {
        let plan = plan(&StackConfig::default());
        let task = plan.by_path("ServiceStack/TaskDefinition/Resource").unwrap();
        let image = &task.properties["ContainerDefinitions"][0]["Image"];
        assert_eq!(image, &json!(artifact().image_uri()));
    }

    #[test]
    fn repository_carries_lifecycle_rule() {
        let plan = plan(&StackConfig::default().with_max_image_count(5));
        let repo = plan.by_path("ServiceStack/Repository").unwrap();
        assert_eq!(repo.kind, "AWS::ECR::Repository");
        let rules = repo.properties.to_string();
        assert!(rules.contains("\"countNumber\":5"), "{rules}");
    }

    #[test]
    fn dependencies_are_ordered() {
        let plan = plan(&StackConfig::default());
        let pos = |path: &str| {
            let logical_id = &plan.by_path(path).unwrap().logical_id;
            plan.position(logical_id).unwrap()
        };

        assert!(pos("ServiceStack/Vpc/Resource") < pos("ServiceStack/Vpc/PublicSubnet1/Subnet"));
        assert!(pos("ServiceStack/Vpc/PublicSubnet1/NatInstance") < pos("ServiceStack/Vpc/PrivateSubnet1/DefaultRoute"));
        assert!(pos("ServiceStack/Vpc/PrivateSubnet1/Subnet") < pos("ServiceStack/Cluster"));
        assert!(pos("ServiceStack/Repository") < pos("ServiceStack/ImageDeploy"));
        assert!(pos("ServiceStack/ImageDeploy") < pos("ServiceStack/TaskDefinition/Resource"));
        assert!(pos("ServiceStack/TaskDefinition/LogGroup") < pos("ServiceStack/Service"));
        assert!(pos("ServiceStack/PostIndicatorsFunction") < pos("ServiceStack/Rule"));
    }

    #[test]
    fn one_nat_instance_regardless_of_zone_count() {
        let mut config = StackConfig::default();
        config.network.max_azs = 2;
        let plan = plan(&config);

        let nats = plan.resources.iter().filter(|r| r.kind == "AWS::EC2::Instance").count();
        let subnets = plan.resources.iter().filter(|r| r.kind == "AWS::EC2::Subnet").count();
        assert_eq!(nats, 1);
        assert_eq!(subnets, 4);
        assert!(plan.by_path("ServiceStack/Vpc/PrivateSubnet2/DefaultRoute").is_some());
    }

    #[test]
    fn schedule_is_rendered_as_cron_expression() {
        let plan = plan(&StackConfig::default());
        let rule = plan.by_path("ServiceStack/Rule").unwrap();
        assert_eq!(
            rule.properties["ScheduleExpression"],
            json!("cron(0 23 ? * SUN-THU *)")
        );
    }

    #[test]
    fn task_role_may_read_its_log_group() {
        let plan = plan(&StackConfig::default());
        let log_group = plan.by_path("ServiceStack/TaskDefinition/LogGroup").unwrap();
        let role = plan.by_path("ServiceStack/TaskDefinition/TaskRole").unwrap();
        let policy = plan.by_path("ServiceStack/LogReadPolicy").unwrap();

        assert_eq!(policy.kind, "AWS::IAM::Policy");
        let statement = &policy.properties["PolicyDocument"]["Statement"][0];
        assert_eq!(
            statement["Action"],
            json!(["logs:DescribeLogStreams", "logs:GetLogEvents"])
        );
        assert_eq!(
            statement["Resource"],
            json!({ "Fn::GetAtt": [log_group.logical_id, "Arn"] })
        );
        assert_eq!(policy.properties["Roles"], json!([{ "Ref": role.logical_id }]));

        let task = plan.by_path("ServiceStack/TaskDefinition/Resource").unwrap();
        assert_eq!(
            task.properties["TaskRoleArn"],
            json!({ "Fn::GetAtt": [role.logical_id, "Arn"] })
        );

        let pos = |logical_id: &str| plan.position(logical_id).unwrap();
        assert!(pos(&log_group.logical_id) < pos(&policy.logical_id));
        assert!(pos(&role.logical_id) < pos(&policy.logical_id));
        let service = plan.by_path("ServiceStack/Service").unwrap();
        assert!(pos(&policy.logical_id) < pos(&service.logical_id));
    }

    #[test]
    fn function_resolves_channel_from_parameter() {
        let variables = |config: &StackConfig| {
            plan(config)
                .by_path("ServiceStack/PostIndicatorsFunction")
                .unwrap()
                .properties["Environment"]["Variables"]
                .clone()
        };

        let defaults = variables(&StackConfig::default());
        assert_eq!(defaults["CHANNEL_ID"], json!("{{resolve:ssm:/service/fx-channel-id}}"));
        assert_eq!(defaults["IMPORTANCE_LEVEL"], json!("3"));

        let mut config = StackConfig::default();
        config.schedule.channel_parameter = None;
        assert!(variables(&config).get("CHANNEL_ID").is_none());
    }

    #[test]
    fn invalid_stack_name_is_rejected() {
        let config = StackConfig::default().with_stack_name("a/b");
        assert!(matches!(
            define_stack(&config, &artifact()),
            Err(ConstructError::InvalidId(_))
        ));
    }
}
